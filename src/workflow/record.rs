use super::task::{TaskId, TaskKind};
use super::task_dag::TaskDag;
use crate::constants::STARTED_TASK_STATES;
use crate::models::{Operation, OperationError, WorkflowType};
use crate::state_machine::{TaskState, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Serialized task DAG plus runtime state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub tenant_id: String,
    pub deployment_id: String,
    #[serde(rename = "type")]
    pub workflow_type: WorkflowType,
    pub task_tree: TaskDag,
    pub attributes: WorkflowAttributes,
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowAttributes {
    pub progress: u8,
    pub total: usize,
    pub completed: usize,
    pub errored: usize,
    pub status: WorkflowStatus,
    /// Seconds, summed over counted tasks
    pub estimated_duration: u64,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub sub_workflows: Vec<SubWorkflowRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubWorkflowStatus {
    InFlight,
    Completed,
    Failed,
}

/// Back-reference from a workflow to a reset-and-retry run of one of its subtrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubWorkflowRef {
    pub id: String,
    pub failed_task: TaskId,
    /// Topmost task that was reset
    pub reset_root: TaskId,
    pub reset_tasks: Vec<TaskId>,
    /// 1-based retry number for `failed_task`
    pub attempt: u32,
    pub status: SubWorkflowStatus,
    pub created_at: DateTime<Utc>,
}

impl SubWorkflowRef {
    pub(crate) fn new(failed_task: TaskId, reset_tasks: Vec<TaskId>, attempt: u32) -> Self {
        let reset_root = reset_tasks.last().copied().unwrap_or(failed_task);
        Self {
            id: Uuid::new_v4().to_string(),
            failed_task,
            reset_root,
            reset_tasks,
            attempt,
            status: SubWorkflowStatus::InFlight,
            created_at: Utc::now(),
        }
    }
}

impl Workflow {
    pub fn new(
        tenant_id: impl Into<String>,
        deployment_id: impl Into<String>,
        workflow_type: WorkflowType,
        task_tree: TaskDag,
    ) -> Self {
        let now = Utc::now();
        let estimated_duration = task_tree
            .tasks()
            .filter(|t| t.kind.is_counted())
            .map(|t| t.properties.estimated_duration)
            .sum();
        let mut workflow = Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            deployment_id: deployment_id.into(),
            workflow_type,
            task_tree,
            attributes: WorkflowAttributes {
                estimated_duration,
                ..Default::default()
            },
            revision: 0,
            created_at: now,
            updated_at: now,
        };
        workflow.update_workflow_status();
        workflow
    }

    /// Recompute progress, counts and derived status from task states.
    ///
    /// Only provider calls and no-op placeholders are counted. Idempotent.
    pub fn update_workflow_status(&mut self) -> WorkflowStatus {
        let mut total = 0usize;
        let mut completed = 0usize;
        let mut errored = 0usize;
        let mut started = false;
        let mut unrecoverable = false;

        for task in self.task_tree.tasks().filter(|t| t.kind.is_counted()) {
            total += 1;
            started |= STARTED_TASK_STATES.contains(&task.state);
            match task.state {
                TaskState::Completed => completed += 1,
                TaskState::Error => {
                    errored += 1;
                    if !task.is_auto_recoverable() {
                        unrecoverable = true;
                    }
                }
                _ => {}
            }
        }

        let progress = if total == 0 {
            100
        } else {
            ((completed * 100) / total) as u8
        };

        let status = if completed == total {
            WorkflowStatus::Complete
        } else if errored > 0 && unrecoverable {
            WorkflowStatus::Failed
        } else if errored > 0 {
            WorkflowStatus::Error
        } else if self.attributes.paused {
            WorkflowStatus::Paused
        } else if !started {
            WorkflowStatus::New
        } else {
            WorkflowStatus::InProgress
        };

        self.attributes.progress = progress;
        self.attributes.total = total;
        self.attributes.completed = completed;
        self.attributes.errored = errored;
        self.attributes.status = status;
        status
    }

    pub fn status(&self) -> WorkflowStatus {
        self.attributes.status
    }

    /// Sub-workflow currently retrying `task`, if any
    pub fn in_flight_sub_workflow(&self, task: TaskId) -> Option<&SubWorkflowRef> {
        self.attributes
            .sub_workflows
            .iter()
            .find(|s| s.failed_task == task && s.status == SubWorkflowStatus::InFlight)
    }

    /// Number of reset sub-workflows launched for `task`
    pub fn sub_workflow_count(&self, task: TaskId) -> usize {
        self.attributes
            .sub_workflows
            .iter()
            .filter(|s| s.failed_task == task)
            .count()
    }

    /// Mark in-flight sub-workflows whose failed task just completed
    pub(crate) fn complete_sub_workflows(&mut self, task: TaskId) {
        for sub in self.attributes.sub_workflows.iter_mut() {
            if sub.failed_task == task && sub.status == SubWorkflowStatus::InFlight {
                sub.status = SubWorkflowStatus::Completed;
            }
        }
    }

    /// Mark in-flight sub-workflows covering `task` as failed
    pub(crate) fn fail_sub_workflows(&mut self, task: TaskId) {
        for sub in self.attributes.sub_workflows.iter_mut() {
            if sub.status == SubWorkflowStatus::InFlight
                && (sub.failed_task == task || sub.reset_tasks.contains(&task))
            {
                sub.status = SubWorkflowStatus::Failed;
            }
        }
    }

    /// Summarize this workflow as a deployment operation
    pub fn to_operation(&self) -> Operation {
        let error_details = self
            .task_tree
            .tasks()
            .filter(|t| t.state == TaskState::Error)
            .filter_map(|t| {
                let exception = t.exception.as_ref()?;
                let retry_link = exception.retriable.then(|| {
                    format!(
                        "/{}/workflows/{}/tasks/{}/+reset-task-tree",
                        self.tenant_id, self.id, t.id
                    )
                });
                let resume_link = exception.resumable.then(|| {
                    format!(
                        "/{}/workflows/{}/tasks/{}/+resume",
                        self.tenant_id, self.id, t.id
                    )
                });
                Some(OperationError {
                    task_id: t.id.0,
                    task_name: t.name.clone(),
                    resource_key: t.properties.resource.clone(),
                    error_type: exception.error_type.clone(),
                    error_message: exception.error_message.clone(),
                    friendly_message: exception.friendly_message.clone(),
                    retriable: exception.retriable,
                    resumable: exception.resumable,
                    traceback: exception.traceback.clone(),
                    retry_link,
                    resume_link,
                })
            })
            .collect();

        Operation {
            workflow_id: self.id.clone(),
            op_type: self.workflow_type,
            status: self.attributes.status,
            tasks: self.attributes.total,
            complete: self.attributes.completed,
            errors: self.attributes.errored,
            progress: self.attributes.progress,
            estimated_duration: self.attributes.estimated_duration,
            error_details,
            last_change: Utc::now(),
        }
    }

    /// Call tasks in dispatch-ready order of their ids
    pub fn call_tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.task_tree
            .tasks()
            .filter(|t| matches!(t.kind, TaskKind::Call(_)))
            .map(|t| t.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{TaskCall, TaskException, TaskProperties};

    fn four_task_workflow() -> (Workflow, Vec<TaskId>) {
        let mut dag = TaskDag::new();
        let ids: Vec<TaskId> = (0..4)
            .map(|i| {
                let id = dag.add_call(
                    format!("T{i}"),
                    TaskCall::new("test", "op"),
                    TaskProperties::new().with_duration(5),
                );
                dag.connect(dag.start(), id).unwrap();
                id
            })
            .collect();
        (
            Workflow::new("tenant", "dep", WorkflowType::Build, dag),
            ids,
        )
    }

    fn fail(workflow: &mut Workflow, id: TaskId, retriable: bool, budget: u32) {
        let task = workflow.task_tree.get_mut(id).unwrap();
        task.state = TaskState::Error;
        task.properties.auto_retry_count = Some(budget);
        task.exception = Some(TaskException {
            error_type: "ProviderTransientError".into(),
            error_message: "boom".into(),
            error_help: None,
            friendly_message: None,
            retriable,
            resumable: false,
            traceback: None,
        });
    }

    #[test]
    fn test_new_workflow_status() {
        let (workflow, _) = four_task_workflow();
        assert_eq!(workflow.status(), WorkflowStatus::New);
        assert_eq!(workflow.attributes.total, 4);
        assert_eq!(workflow.attributes.progress, 0);
        assert_eq!(workflow.attributes.estimated_duration, 20);
    }

    #[test]
    fn test_progress_steps_by_quarter() {
        let (mut workflow, ids) = four_task_workflow();
        let mut observed = vec![workflow.update_workflow_status_progress()];
        for id in ids {
            workflow.task_tree.get_mut(id).unwrap().state = TaskState::Completed;
            observed.push(workflow.update_workflow_status_progress());
        }
        assert_eq!(observed, vec![0, 25, 50, 75, 100]);
        assert_eq!(workflow.status(), WorkflowStatus::Complete);
    }

    #[test]
    fn test_update_is_idempotent() {
        let (mut workflow, ids) = four_task_workflow();
        workflow.task_tree.get_mut(ids[0]).unwrap().state = TaskState::Waiting;
        let first = workflow.update_workflow_status();
        let snapshot = workflow.attributes.clone();
        let second = workflow.update_workflow_status();
        assert_eq!(first, second);
        assert_eq!(snapshot, workflow.attributes);
        assert_eq!(first, WorkflowStatus::InProgress);
    }

    #[test]
    fn test_recoverable_error_vs_terminal_failure() {
        let (mut workflow, ids) = four_task_workflow();
        fail(&mut workflow, ids[0], true, 1);
        assert_eq!(workflow.update_workflow_status(), WorkflowStatus::Error);

        fail(&mut workflow, ids[0], true, 0);
        assert_eq!(workflow.update_workflow_status(), WorkflowStatus::Failed);

        fail(&mut workflow, ids[0], false, 3);
        assert_eq!(workflow.update_workflow_status(), WorkflowStatus::Failed);
    }

    #[test]
    fn test_operation_carries_error_links() {
        let (mut workflow, ids) = four_task_workflow();
        fail(&mut workflow, ids[1], true, 0);
        workflow.update_workflow_status();

        let op = workflow.to_operation();
        assert_eq!(op.status, WorkflowStatus::Failed);
        assert_eq!(op.errors, 1);
        let detail = &op.error_details[0];
        assert_eq!(detail.task_id, ids[1].0);
        assert!(detail.retry_link.as_deref().unwrap().ends_with("/+reset-task-tree"));
        assert!(detail.resume_link.is_none());
    }

    impl Workflow {
        fn update_workflow_status_progress(&mut self) -> u8 {
            self.update_workflow_status();
            self.attributes.progress
        }
    }
}
