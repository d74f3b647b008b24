//! Planning errors.

/// Planner result type
pub type PlanResult<T> = Result<T, PlanError>;

/// Errors that make a plan impossible to build
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// Strategy name is not one of the known strategies
    #[error("Invalid strategy '{name}', expected one of: {expected}")]
    InvalidStrategy {
        /// Name that was requested
        name: String,
        /// Comma separated known names
        expected: String,
    },

    /// Filter expression could not be understood
    #[error("Invalid filter: {reason}")]
    InvalidFilter {
        /// What was wrong
        reason: String,
    },
}
