//! Runtime errors.

use gantry_core::CoreError;
use gantry_plan::PlanError;

/// Result type for orchestrator calls
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Orchestrator failures. Test failures and refusals are outcomes, not errors.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The plan could not be built
    #[error("planning failed: {0}")]
    Plan(#[from] PlanError),

    /// Inventory or configuration problem
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The orchestrator was already shut down
    #[error("orchestrator is shut down")]
    ShutDown,

    /// `run` was called before `start`
    #[error("orchestrator not started")]
    NotStarted,
}
