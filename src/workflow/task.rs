use crate::state_machine::TaskState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Index of a task in its workflow's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tags used for cross-task wiring lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskTag {
    /// First task of a provider chain; reset walks stop here
    Root,
    /// Last task of a provider chain
    Final,
    Create,
    Build,
    Delete,
    Configure,
    Connect,
    Pause,
    Wait,
}

/// Remote operation a task performs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCall {
    pub provider: String,
    pub operation: String,
    #[serde(default)]
    pub resource_key: Option<String>,
    #[serde(default)]
    pub params: Value,
}

impl TaskCall {
    pub fn new(provider: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            operation: operation.into(),
            resource_key: None,
            params: Value::Null,
        }
    }

    pub fn for_resource(mut self, key: impl Into<String>) -> Self {
        self.resource_key = Some(key.into());
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// Synthetic tree root, completed immediately
    Root,
    /// Synthetic start node every chain hangs off
    Start,
    /// Join over several predecessors
    Merge,
    /// Placeholder keeping an otherwise empty workflow well-formed
    NoOp,
    Call(TaskCall),
}

impl TaskKind {
    /// Structural tasks complete without dispatch
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Root | Self::Start | Self::Merge | Self::NoOp)
    }

    /// Tasks counted toward workflow progress
    pub fn is_counted(&self) -> bool {
        matches!(self, Self::Call(_) | Self::NoOp)
    }

    pub fn call(&self) -> Option<&TaskCall> {
        match self {
            Self::Call(call) => Some(call),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskProperties {
    /// Seconds
    #[serde(default)]
    pub estimated_duration: u64,
    /// Remaining automatic reset budget
    #[serde(default)]
    pub auto_retry_count: Option<u32>,
    #[serde(default)]
    pub task_tags: Vec<TaskTag>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

impl TaskProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tagged(mut self, tags: &[TaskTag]) -> Self {
        for tag in tags {
            if !self.task_tags.contains(tag) {
                self.task_tags.push(*tag);
            }
        }
        self
    }

    pub fn for_resource(mut self, key: impl Into<String>) -> Self {
        self.resource = Some(key.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.estimated_duration = seconds;
        self
    }

    pub fn with_auto_retry_count(mut self, count: u32) -> Self {
        self.auto_retry_count = Some(count);
        self
    }

    pub fn has_tag(&self, tag: TaskTag) -> bool {
        self.task_tags.contains(&tag)
    }
}

/// Exception payload carried by a task in ERROR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskException {
    pub error_type: String,
    pub error_message: String,
    #[serde(default)]
    pub error_help: Option<String>,
    #[serde(default)]
    pub friendly_message: Option<String>,
    pub retriable: bool,
    pub resumable: bool,
    #[serde(default)]
    pub traceback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub kind: TaskKind,
    pub state: TaskState,
    #[serde(default)]
    pub properties: TaskProperties,
    /// Tree parent; always the first input when there is one
    #[serde(default)]
    pub parent: Option<TaskId>,
    #[serde(default)]
    pub children: Vec<TaskId>,
    /// Logical predecessors
    #[serde(default)]
    pub inputs: Vec<TaskId>,
    #[serde(default)]
    pub outputs: Vec<TaskId>,
    /// Dispatches since the task was last reset
    #[serde(default)]
    pub attempts: u32,
    /// Reschedules caused by retry-after or resumable outcomes
    #[serde(default)]
    pub polls: u32,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub exception: Option<TaskException>,
    /// Bookkeeping reference for the in-flight remote call
    #[serde(default)]
    pub dispatch_ref: Option<String>,
}

impl Task {
    pub(crate) fn new(id: TaskId, name: String, kind: TaskKind, properties: TaskProperties) -> Self {
        Self {
            id,
            name,
            kind,
            state: TaskState::Future,
            properties,
            parent: None,
            children: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            attempts: 0,
            polls: 0,
            result: None,
            exception: None,
            dispatch_ref: None,
        }
    }

    pub fn has_tag(&self, tag: TaskTag) -> bool {
        self.properties.has_tag(tag)
    }

    /// Put the task back to FUTURE and drop all execution bookkeeping
    pub fn reset(&mut self) {
        self.state = TaskState::Future;
        self.attempts = 0;
        self.polls = 0;
        self.result = None;
        self.exception = None;
        self.dispatch_ref = None;
    }

    /// Whether an ERROR on this task can still be recovered automatically
    pub fn is_auto_recoverable(&self) -> bool {
        let retriable = self
            .exception
            .as_ref()
            .map(|e| e.retriable)
            .unwrap_or(false);
        retriable && self.properties.auto_retry_count.unwrap_or(0) > 0
    }
}
