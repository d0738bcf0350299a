//! # cascades-core: Cascades Query Optimizer Core
//!
//! Data structures and search algorithm for a Cascades-style, cost-based query
//! optimizer. Given a logical plan, a catalog, a rule set and a cost model, it returns
//! the cheapest physical plan that satisfies the requested physical properties.
//!
//! ## Module Overview
//!
//! - **`expr`**: scalar expressions and logical/physical operators.
//! - **`plan`**: input logical trees and output physical plan trees.
//! - **`memo`**: groups of equivalent expressions, deduplication, group merging and
//!   winner bookkeeping.
//! - **`pattern`**: rule patterns and binding enumeration.
//! - **`rule`**: the `Rule` trait, the registry and the per-run active rule set.
//! - **`search`** / **`tasks`**: the task scheduler and the Cascades tasks it runs.
//! - **`properties`**: physical property sets, child requirements and enforcers.
//! - **`cost`** / **`stats`**: the cost model and cardinality estimation.
//! - **`catalog`**: read-only access to table metadata and statistics.
//! - **`config`** / **`error`**: run configuration and the error type.
//!
//! ```no_run
//! use cascades_core::catalog::InMemoryCatalog;
//! use cascades_core::config::OptimizerConfig;
//! use cascades_core::cost::DefaultCostModel;
//! use cascades_core::expr::TableRef;
//! use cascades_core::plan::LogicalPlan;
//! use cascades_core::properties::PhysicalPropertySet;
//! use cascades_core::rule::RuleRegistry;
//! use cascades_core::search::CascadesContext;
//! use std::sync::Arc;
//!
//! # fn main() -> cascades_core::error::Result<()> {
//! let registry = RuleRegistry::new();
//! let mut ctx = CascadesContext::from_registry(
//!     &registry,
//!     Arc::new(DefaultCostModel::default()),
//!     Arc::new(InMemoryCatalog::new()),
//!     OptimizerConfig::default(),
//! )?;
//! let plan = LogicalPlan::scan(TableRef::new("tpch", "orders"));
//! let outcome = ctx.optimize(&plan, &PhysicalPropertySet::any())?;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod cost;
pub mod error;
pub mod expr;
pub mod memo;
pub mod pattern;
pub mod plan;
pub mod properties;
pub mod rule;
pub mod search;
pub mod stats;
pub mod tasks;

pub use error::{OptimizerError, Result};
