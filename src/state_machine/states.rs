use serde::{Deserialize, Serialize};
use std::fmt;

/// Deployment lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    /// Created, not yet planned
    New,
    /// Resources planned, nothing built
    Planned,
    /// Build workflow completed
    Up,
    Failed,
    Down,
    Alert,
    Unreachable,
    Deleted,
}

impl DeploymentStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted)
    }

    /// Degraded states that may recover to UP
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Alert | Self::Unreachable | Self::Down)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Planned => write!(f, "PLANNED"),
            Self::Up => write!(f, "UP"),
            Self::Failed => write!(f, "FAILED"),
            Self::Down => write!(f, "DOWN"),
            Self::Alert => write!(f, "ALERT"),
            Self::Unreachable => write!(f, "UNREACHABLE"),
            Self::Deleted => write!(f, "DELETED"),
        }
    }
}

impl std::str::FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "PLANNED" => Ok(Self::Planned),
            "UP" => Ok(Self::Up),
            "FAILED" => Ok(Self::Failed),
            "DOWN" => Ok(Self::Down),
            "ALERT" => Ok(Self::Alert),
            "UNREACHABLE" => Ok(Self::Unreachable),
            "DELETED" => Ok(Self::Deleted),
            _ => Err(format!("Invalid deployment status: {s}")),
        }
    }
}

impl Default for DeploymentStatus {
    fn default() -> Self {
        Self::New
    }
}

/// Normalized resource status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    New,
    Build,
    Active,
    Configure,
    Error,
    Deleting,
    Deleted,
}

impl ResourceStatus {
    /// Resources in this state still need their build tasks
    pub fn needs_build(&self) -> bool {
        matches!(self, Self::New)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Build => write!(f, "BUILD"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Configure => write!(f, "CONFIGURE"),
            Self::Error => write!(f, "ERROR"),
            Self::Deleting => write!(f, "DELETING"),
            Self::Deleted => write!(f, "DELETED"),
        }
    }
}

impl Default for ResourceStatus {
    fn default() -> Self {
        Self::New
    }
}

/// Per-task execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Waiting on predecessors
    Future,
    /// All predecessors completed
    Ready,
    /// Dispatched, blocked on a remote call
    Waiting,
    Completed,
    Error,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Check if this task satisfies dependencies for its successors
    pub fn satisfies_dependencies(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Future => write!(f, "FUTURE"),
            Self::Ready => write!(f, "READY"),
            Self::Waiting => write!(f, "WAITING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Error => write!(f, "ERROR"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::Future
    }
}

/// Aggregate workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStatus {
    #[serde(rename = "NEW")]
    New,
    #[serde(rename = "IN PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETE")]
    Complete,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "PAUSED")]
    Paused,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::InProgress => write!(f, "IN PROGRESS"),
            Self::Complete => write!(f, "COMPLETE"),
            Self::Error => write!(f, "ERROR"),
            Self::Failed => write!(f, "FAILED"),
            Self::Paused => write!(f, "PAUSED"),
        }
    }
}

impl Default for WorkflowStatus {
    fn default() -> Self {
        Self::New
    }
}
