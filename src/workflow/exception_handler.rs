//! # Reset/Retry Exception Handler
//!
//! Recovers failed tasks by rewinding the provider chain they belong to and
//! recording a retry sub-workflow against the parent workflow.
//!
//! ## Overview
//!
//! On a recoverable failure the handler walks from the failed task up its tree
//! parents to the nearest task tagged [`TaskTag::Root`] (stopping before any
//! Merge/Start/Root structural node), resets every visited task to FUTURE,
//! decrements the failed task's `auto_retry_count` and pushes a
//! [`SubWorkflowRef`]. The engine then re-runs the rewound tasks as part of the
//! same execution; completion of the failed task closes the sub-workflow.
//!
//! At most one reset may be in flight per task.

use super::record::{SubWorkflowRef, Workflow};
use super::task::{TaskId, TaskTag};
use super::task_dag::TaskDag;
use crate::error::{DeployerError, Result};
use crate::state_machine::TaskState;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum ResetOutcome {
    /// Subtree rewound; the new sub-workflow reference
    Reset(SubWorkflowRef),
    /// Another reset for this task has not finished yet
    AlreadyInFlight(String),
    BudgetExhausted,
    NotRetriable,
    NotInError,
}

impl ResetOutcome {
    pub fn is_reset(&self) -> bool {
        matches!(self, Self::Reset(_))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResetTaskTreeHandler;

impl ResetTaskTreeHandler {
    pub fn new() -> Self {
        Self
    }

    /// Automatic recovery, bounded by the task's `auto_retry_count`
    pub fn handle(&self, workflow: &mut Workflow, task_id: TaskId) -> Result<ResetOutcome> {
        let task = workflow.task_tree.get(task_id)?;
        if task.state != TaskState::Error {
            return Ok(ResetOutcome::NotInError);
        }
        let retriable = task.exception.as_ref().map_or(false, |e| e.retriable);
        if !retriable {
            return Ok(ResetOutcome::NotRetriable);
        }
        let budget = task.properties.auto_retry_count.unwrap_or(0);
        if budget == 0 {
            debug!(workflow_id = %workflow.id, task_id = %task_id, "Retry budget exhausted");
            return Ok(ResetOutcome::BudgetExhausted);
        }
        if let Some(sub) = workflow.in_flight_sub_workflow(task_id) {
            return Ok(ResetOutcome::AlreadyInFlight(sub.id.clone()));
        }

        let outcome = self.launch(workflow, task_id)?;
        workflow.task_tree.get_mut(task_id)?.properties.auto_retry_count = Some(budget - 1);
        workflow.update_workflow_status();
        Ok(outcome)
    }

    /// Operator-requested retry; ignores the automatic budget
    pub fn reset_manual(&self, workflow: &mut Workflow, task_id: TaskId) -> Result<ResetOutcome> {
        let task = workflow.task_tree.get(task_id)?;
        if task.state != TaskState::Error {
            return Ok(ResetOutcome::NotInError);
        }
        if let Some(sub) = workflow.in_flight_sub_workflow(task_id) {
            return Ok(ResetOutcome::AlreadyInFlight(sub.id.clone()));
        }
        let outcome = self.launch(workflow, task_id)?;
        workflow.update_workflow_status();
        Ok(outcome)
    }

    /// Re-run a single resumable task without touching its ancestors
    pub fn resume_task(&self, workflow: &mut Workflow, task_id: TaskId) -> Result<()> {
        let task = workflow.task_tree.get_mut(task_id)?;
        let resumable = task.exception.as_ref().map_or(false, |e| e.resumable);
        if task.state != TaskState::Error || !resumable {
            return Err(DeployerError::StateError(format!(
                "Task {} ('{}') is not a resumable failure",
                task.id, task.name
            )));
        }
        task.reset();
        workflow.update_workflow_status();
        Ok(())
    }

    fn launch(&self, workflow: &mut Workflow, task_id: TaskId) -> Result<ResetOutcome> {
        let reset_tasks = Self::reset_task_tree(&mut workflow.task_tree, task_id)?;
        let attempt = workflow.sub_workflow_count(task_id) as u32 + 1;
        let sub = SubWorkflowRef::new(task_id, reset_tasks, attempt);

        info!(
            workflow_id = %workflow.id,
            task_id = %task_id,
            sub_workflow_id = %sub.id,
            reset_root = %sub.reset_root,
            reset_count = sub.reset_tasks.len(),
            attempt = attempt,
            "Reset task tree for retry"
        );

        workflow.attributes.sub_workflows.push(sub.clone());
        Ok(ResetOutcome::Reset(sub))
    }

    /// Rewind `task_id` and its tree ancestors up to the nearest root-tagged
    /// task. Returns the reset tasks, failed task first.
    pub fn reset_task_tree(dag: &mut TaskDag, task_id: TaskId) -> Result<Vec<TaskId>> {
        let mut visited = Vec::new();
        let mut current = Some(task_id);
        while let Some(id) = current {
            let task = dag.get(id)?;
            if id != task_id && task.kind.is_structural() {
                break;
            }
            let stop = task.has_tag(TaskTag::Root);
            let parent = task.parent;
            dag.get_mut(id)?.reset();
            visited.push(id);
            if stop {
                break;
            }
            current = parent;
        }
        Ok(visited)
    }
}
