//! # System Constants
//!
//! Event names, limits and status groupings shared across the orchestrator.

use crate::state_machine::{DeploymentStatus, TaskState};

/// Lifecycle event names published on the [`EventPublisher`](crate::events::EventPublisher)
pub mod events {
    pub const DEPLOYMENT_PLANNED: &str = "deployment.planned";
    pub const DEPLOYMENT_STATUS_CHANGED: &str = "deployment.status_changed";
    pub const WORKFLOW_STARTED: &str = "workflow.started";
    pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
    pub const WORKFLOW_PAUSED: &str = "workflow.paused";
    pub const TASK_COMPLETED: &str = "workflow.task_completed";
    pub const TASK_FAILED: &str = "workflow.task_failed";
    pub const TASK_RESET: &str = "workflow.task_reset";
    pub const TASK_RESCHEDULED: &str = "workflow.task_rescheduled";
}

/// System-wide limits and defaults
pub mod system {
    /// Default per-task automatic reset budget
    pub const DEFAULT_AUTO_RETRY_COUNT: u32 = 3;
    /// Upper bound on concurrent provider verification calls during planning
    pub const MAX_VERIFICATION_WORKERS: usize = 16;
    pub const DEFAULT_MAX_REQUIREMENT_PASSES: u32 = 10;
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_MAX_WAIT_POLLS: u32 = 360;
    pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1000;
    /// Number of compare-and-swap retries for postback writes
    pub const MAX_SAVE_RETRIES: u32 = 5;
}

/// Provider key reserved for tasks the orchestrator executes itself
pub const WORKFLOW_PROVIDER: &str = "workflow";
pub const PAUSE_WORKFLOW_OPERATION: &str = "pause_workflow";

/// Deployment statuses from which a delete may be requested
pub const DELETABLE_STATUSES: &[DeploymentStatus] = &[
    DeploymentStatus::Planned,
    DeploymentStatus::Up,
    DeploymentStatus::Failed,
    DeploymentStatus::Alert,
    DeploymentStatus::Unreachable,
    DeploymentStatus::Down,
];

/// Task states that count as "started" for workflow status purposes
pub const STARTED_TASK_STATES: &[TaskState] =
    &[TaskState::Waiting, TaskState::Completed, TaskState::Error];
