//! # Workflow Subsystem
//!
//! Task DAG model, spec building, execution and recovery.
//!
//! - [`task_dag`]: arena of tasks with tree and join edges plus `wait_for`
//! - [`spec_builder`]: deployment to task DAG (build and delete)
//! - [`record`]: the persisted [`Workflow`] and its derived status
//! - [`engine`]: the scheduler that drives a workflow to completion
//! - [`exception_handler`]: reset-and-retry of failed provider chains
//! - [`postback`]: resource updates reported by completed tasks

pub mod engine;
pub mod exception_handler;
pub mod postback;
pub mod record;
pub mod spec_builder;
pub mod task;
pub mod task_dag;

pub use crate::models::WorkflowType;
pub use engine::{PauseHandle, TaskDispatcher, TaskOutcome, TaskOutput, WorkflowEngine};
pub use exception_handler::{ResetOutcome, ResetTaskTreeHandler};
pub use postback::{apply_postbacks, PostbackSink, ResourcePostback};
pub use record::{SubWorkflowRef, SubWorkflowStatus, Workflow, WorkflowAttributes};
pub use spec_builder::{build_order, TaskChain, WorkflowSpecBuilder};
pub use task::{Task, TaskCall, TaskException, TaskId, TaskKind, TaskProperties, TaskTag};
pub use task_dag::TaskDag;
