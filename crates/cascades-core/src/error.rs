use crate::memo::GroupId;
use crate::properties::PhysicalPropertySet;

/// Errors surfaced to the caller of an optimization run.
///
/// Budget exhaustion is not an error. It is reported through
/// [`SearchStatus::Partial`](crate::search::SearchStatus) alongside whatever plan was
/// found.
#[derive(Debug, thiserror::Error)]
pub enum OptimizerError {
    /// The input plan violates a structural precondition. Nothing was optimized.
    #[error("malformed plan: {0}")]
    MalformedPlan(String),

    /// The search finished and the root has no winner for the requirement.
    #[error("no physical plan satisfies {required} for group {root}; groups without a winner: {missing:?}")]
    NoPhysicalPlan {
        root: GroupId,
        required: PhysicalPropertySet,
        missing: Vec<GroupId>,
    },

    #[error("invalid value {value:?} for configuration key {key}")]
    InvalidConfig { key: String, value: String },

    #[error("rule {0} registered twice")]
    DuplicateRule(String),

    #[error("invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = OptimizerError> = std::result::Result<T, E>;
