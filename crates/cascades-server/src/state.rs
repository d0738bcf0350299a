//! # Application State
//!
//! Created once at startup and shared by every handler through `Arc`.
//!
//! - **Rule registry**: rules are stateless, so the registry is shared, never cloned.
//! - **Catalog**: an immutable snapshot behind `RwLock<Arc<_>>`. An optimization grabs
//!   the current `Arc` and runs against it; registering tables builds a new snapshot and
//!   swaps it in, so running optimizations never see a half-updated catalog.
//! - **Base configuration**: budgets, cost weights and the server-wide rule selection.
//!   Each request layers its session variables on a copy of it.

use cascades_core::catalog::InMemoryCatalog;
use cascades_core::config::OptimizerConfig;
use cascades_core::rule::RuleRegistry;
use std::sync::{Arc, PoisonError, RwLock};

pub struct AppState {
    pub rule_registry: Arc<RuleRegistry>,
    catalog: RwLock<Arc<InMemoryCatalog>>,
    config: RwLock<OptimizerConfig>,
}

impl AppState {
    pub fn new(config: OptimizerConfig) -> Self {
        Self::with_parts(cascades_rules::default_rule_registry(), InMemoryCatalog::new(), config)
    }

    pub fn with_parts(registry: RuleRegistry, catalog: InMemoryCatalog, config: OptimizerConfig) -> Self {
        Self {
            rule_registry: Arc::new(registry),
            catalog: RwLock::new(Arc::new(catalog)),
            config: RwLock::new(config),
        }
    }

    /// The current catalog snapshot.
    pub fn catalog(&self) -> Arc<InMemoryCatalog> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Copy the current snapshot, apply `f` to the copy and publish it.
    pub fn update_catalog<F>(&self, f: F) -> Arc<InMemoryCatalog>
    where
        F: FnOnce(&mut InMemoryCatalog),
    {
        let mut guard = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = InMemoryCatalog::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
        guard.clone()
    }

    pub fn config(&self) -> OptimizerConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn update_config<F>(&self, f: F) -> OptimizerConfig
    where
        F: FnOnce(&mut OptimizerConfig),
    {
        let mut guard = self.config.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
        guard.clone()
    }
}
