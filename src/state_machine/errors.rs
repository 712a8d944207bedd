use thiserror::Error;

/// Error types for task and query lifecycle transitions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Guard condition failed: {reason}")]
    GuardFailed { reason: String },

    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: Option<String>, to: String },

    #[error("Unknown task {task_id}")]
    UnknownTask { task_id: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StateMachineError {
    /// The guard that refuses a RUNNING transition when the query is at capacity
    pub fn is_capacity_guard(&self) -> bool {
        matches!(self, Self::GuardFailed { reason } if reason.starts_with(MAX_RUNNING_GUARD))
    }
}

pub(crate) const MAX_RUNNING_GUARD: &str = "max running tasks reached";

pub type StateMachineResult<T> = Result<T, StateMachineError>;
