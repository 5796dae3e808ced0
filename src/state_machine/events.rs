use serde::{Deserialize, Serialize};

/// Events that can trigger deployment state transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DeploymentEvent {
    /// Planning completed
    Plan,
    /// Build workflow completed
    Complete,
    Alert,
    Unreachable,
    Down,
    /// Degraded deployment is healthy again
    Recover,
    /// Mark deployment as failed with a reason
    Fail(String),
    /// Delete workflow completed
    Delete,
}

impl DeploymentEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Complete => "complete",
            Self::Alert => "alert",
            Self::Unreachable => "unreachable",
            Self::Down => "down",
            Self::Recover => "recover",
            Self::Fail(_) => "fail",
            Self::Delete => "delete",
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }
}
