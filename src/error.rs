//! Error type shared by every planner.
//!
//! Expected outcomes ("no path", "infeasible", "not converged") are reported
//! through result flags, never through this type. [`PlanError`] is reserved
//! for malformed inputs that would otherwise produce meaningless output.

/// Precondition failure detected before or during a run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    /// The problem description is inconsistent (bad dimensions, probabilities
    /// that do not sum to one, references to undeclared names, ...).
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// A configuration parameter is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PlanError>;
