use crate::state_machine::WorkflowStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowType {
    Build,
    Delete,
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => write!(f, "BUILD"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// Status summary of the workflow currently (or last) running against a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub workflow_id: String,
    #[serde(rename = "type")]
    pub op_type: WorkflowType,
    pub status: WorkflowStatus,
    pub tasks: usize,
    pub complete: usize,
    pub errors: usize,
    pub progress: u8,
    /// Seconds
    pub estimated_duration: u64,
    #[serde(default)]
    pub error_details: Vec<OperationError>,
    pub last_change: DateTime<Utc>,
}

/// Structured detail for one failed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    pub task_id: usize,
    pub task_name: String,
    pub resource_key: Option<String>,
    pub error_type: String,
    pub error_message: String,
    pub friendly_message: Option<String>,
    pub retriable: bool,
    pub resumable: bool,
    pub traceback: Option<String>,
    pub retry_link: Option<String>,
    pub resume_link: Option<String>,
}
