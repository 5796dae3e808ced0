//! # State Machines
//!
//! Status enums for deployments, resources, tasks and workflows, and the
//! guarded deployment lifecycle state machine.

pub mod deployment_state_machine;
pub mod errors;
pub mod events;
pub mod guards;
pub mod states;

pub use deployment_state_machine::DeploymentStateMachine;
pub use errors::{StateMachineError, StateMachineResult};
pub use events::DeploymentEvent;
pub use guards::StateGuard;
pub use states::{DeploymentStatus, ResourceStatus, TaskState, WorkflowStatus};
