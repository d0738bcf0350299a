//! # HTTP Route Handlers
//!
//! ## Optimization Pipeline
//!
//! `POST /optimize` takes a JSON logical plan, the required output properties and
//! optional session variables:
//!
//! 1. **Configure**: copy the server's base configuration and layer the session
//!    variables on top.
//! 2. **Snapshot**: take the current catalog `Arc`.
//! 3. **Optimize**: run one Cascades search on a blocking thread. The search is CPU-bound
//!    and must not stall the async runtime.
//! 4. **Respond**: the physical plan (if any), the completion status and search stats.
//!
//! ## Error Handling
//!
//! [`ApiError`] maps to status codes:
//! - 400 Bad Request: malformed plan, invalid session variable
//! - 422 Unprocessable Entity: no physical plan exists under the active rules
//! - 500 Internal Server Error: rule registry conflicts, a crashed optimization task

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use cascades_core::catalog::TableEntry;
use cascades_core::config::RuleConfig;
use cascades_core::cost::DefaultCostModel;
use cascades_core::expr::TableRef;
use cascades_core::plan::{LogicalPlan, PlanNode};
use cascades_core::properties::PhysicalPropertySet;
use cascades_core::rule::ActiveRules;
use cascades_core::search::{CascadesContext, OptimizeOutcome, SearchStats, SearchStatus};
use cascades_core::OptimizerError;

use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    #[error("optimization task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Optimizer(
                OptimizerError::MalformedPlan(_) | OptimizerError::InvalidConfig { .. } | OptimizerError::Json(_),
            ) => StatusCode::BAD_REQUEST,
            ApiError::Optimizer(OptimizerError::NoPhysicalPlan { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Optimizer(OptimizerError::DuplicateRule(_)) | ApiError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// GET /rules: the rules a request without session overrides would run with.
pub async fn list_rules(State(state): State<Arc<AppState>>) -> Result<Json<RulesResponse>, ApiError> {
    let config = state.config();
    let active = ActiveRules::new(&state.rule_registry, &config.rules)?;
    let rules = active
        .iter()
        .map(|r| RuleInfo {
            name: r.name().to_string(),
            phase: r.phase().to_string(),
        })
        .collect();
    Ok(Json(RulesResponse { rules }))
}

#[derive(Serialize)]
pub struct RulesResponse {
    pub rules: Vec<RuleInfo>,
}

#[derive(Serialize)]
pub struct RuleInfo {
    pub name: String,
    pub phase: String,
}

#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub plan: LogicalPlan,
    #[serde(default)]
    pub required: PhysicalPropertySet,
    /// Session variables layered over the server configuration for this request only.
    #[serde(default)]
    pub session: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct OptimizeResponse {
    pub plan: Option<PlanNode>,
    pub status: SearchStatus,
    pub stats: SearchStats,
    /// Indented text rendering of `plan`.
    pub explain: Option<String>,
}

impl From<OptimizeOutcome> for OptimizeResponse {
    fn from(outcome: OptimizeOutcome) -> Self {
        Self {
            explain: outcome.plan.as_ref().map(|p| p.display(0)),
            plan: outcome.plan,
            status: outcome.status,
            stats: outcome.stats,
        }
    }
}

/// POST /optimize
pub async fn optimize(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OptimizeRequest>,
) -> Result<Json<OptimizeResponse>, ApiError> {
    let outcome = tokio::task::spawn_blocking(move || run_optimization(&state, &req)).await??;
    Ok(Json(outcome.into()))
}

/// One optimization run: a fresh context per request, nothing shared but the registry
/// and the catalog snapshot.
pub(crate) fn run_optimization(state: &AppState, req: &OptimizeRequest) -> Result<OptimizeOutcome, ApiError> {
    let config = state.config().apply_session_vars(&req.session)?;
    let cost_model = Arc::new(DefaultCostModel::new(config.cost.clone()));
    let mut ctx = CascadesContext::from_registry(&state.rule_registry, cost_model, state.catalog(), config)?;
    let outcome = ctx.optimize(&req.plan, &req.required)?;
    info!(
        status = ?outcome.status,
        tasks = outcome.stats.tasks_run,
        groups = outcome.stats.groups,
        cost = outcome.plan.as_ref().map(|p| p.cost.total),
        "optimized plan"
    );
    Ok(outcome)
}

/// Request body for `POST /rules/configure`. Changes apply to every later request.
#[derive(Debug, Deserialize)]
pub struct ConfigureRulesRequest {
    #[serde(default)]
    pub enable: Vec<String>,
    #[serde(default)]
    pub disable: Vec<String>,
    /// Connector type whose rule set joins the base rules (e.g. "hive", "iceberg").
    pub source: Option<String>,
}

/// POST /rules/configure
pub async fn configure_rules(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConfigureRulesRequest>,
) -> Json<RuleConfig> {
    for name in req.enable.iter().chain(&req.disable) {
        if !state.rule_registry.contains(name) {
            warn!(rule = %name, "configuring a rule that is not registered");
        }
    }
    let config = state.update_config(|config| {
        for name in &req.enable {
            config.rules.disabled.remove(name);
            if let Some(allowed) = config.rules.enabled.as_mut() {
                allowed.insert(name.clone());
            }
        }
        config.rules.disabled.extend(req.disable.iter().cloned());
        if let Some(source) = &req.source {
            config.rules.source_type = Some(source.clone()).filter(|s| !s.is_empty());
        }
    });
    info!(disabled = ?config.rules.disabled, source = ?config.rules.source_type, "rule configuration updated");
    Json(config.rules)
}

#[derive(Debug, Deserialize)]
pub struct RegisterTablesRequest {
    pub tables: Vec<TableRegistration>,
}

#[derive(Debug, Deserialize)]
pub struct TableRegistration {
    pub table: TableRef,
    #[serde(flatten)]
    pub entry: TableEntry,
}

#[derive(Debug, Serialize)]
pub struct RegisterTablesResponse {
    pub registered: usize,
    pub total: usize,
}

/// POST /catalog/tables: add or replace table metadata.
pub async fn register_tables(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterTablesRequest>,
) -> Json<RegisterTablesResponse> {
    let registered = req.tables.len();
    let catalog = state.update_catalog(|catalog| {
        for t in req.tables {
            catalog.add_table(&t.table, t.entry.columns, t.entry.stats);
        }
    });
    info!(registered, total = catalog.len(), "catalog snapshot replaced");
    Json(RegisterTablesResponse {
        registered,
        total: catalog.len(),
    })
}
