use crate::error::DeployerError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateMachineError {
    #[error("Invalid transition from {from} on event '{event}'")]
    InvalidTransition { from: String, event: String },

    #[error("Guard '{guard}' rejected transition: {reason}")]
    GuardFailed { guard: String, reason: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;

/// Result type for guard checks
pub type GuardResult<T> = Result<T, StateMachineError>;

pub fn guard_failed(guard: &str, reason: impl Into<String>) -> StateMachineError {
    StateMachineError::GuardFailed {
        guard: guard.to_string(),
        reason: reason.into(),
    }
}

impl From<StateMachineError> for DeployerError {
    fn from(error: StateMachineError) -> Self {
        DeployerError::StateError(error.to_string())
    }
}
