//! # Workflow Engine
//!
//! Drives a [`Workflow`] task DAG to a terminal or paused state.
//!
//! ## Overview
//!
//! Each scheduling pass promotes FUTURE tasks whose inputs have all completed
//! to READY, completes structural tasks (Start, Merge, NoOp) in place and hands
//! READY provider calls to the [`TaskDispatcher`]. Dispatches run concurrently
//! up to `max_concurrent_tasks`; their outcomes are folded back into the DAG one
//! at a time, so the workflow record only ever has a single writer.
//!
//! ```text
//! FUTURE ──inputs done──▶ READY ──dispatch──▶ WAITING ──┬─ Completed ──▶ COMPLETED
//!                           ▲                           ├─ RetryAfter ─┐
//!                           └─────── rescheduled ◀──────┤              │
//!                                                       └─ Failed ─────┴▶ ERROR ─▶ reset handler
//! ```
//!
//! Terminal errors go through the [`ResetTaskTreeHandler`], which may rewind the
//! failed provider chain; rewound tasks are picked up by the next pass.
//!
//! Pausing stops new dispatches. Calls already in flight are allowed to finish
//! and the workflow reports PAUSED; a later run resumes from the stored states.

use super::exception_handler::{ResetOutcome, ResetTaskTreeHandler};
use super::postback::{PostbackSink, ResourcePostback};
use super::record::Workflow;
use super::task::{TaskCall, TaskException, TaskId, TaskKind};
use crate::config::ExecutionConfig;
use crate::constants::events;
use crate::error::{DeployerError, ProviderError, ProviderErrorKind, Result};
use crate::events::EventPublisher;
use crate::logging::log_workflow_operation;
use crate::models::RequestContext;
use crate::orchestration::error_classifier::{
    ErrorClassifier, ErrorContext, StandardErrorClassifier,
};
use crate::state_machine::{TaskState, WorkflowStatus};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Data returned by a successful provider call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutput {
    pub data: Value,
    /// Resource updates to persist on the deployment
    pub postbacks: Vec<ResourcePostback>,
}

impl TaskOutput {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            postbacks: Vec::new(),
        }
    }

    pub fn with_postback(mut self, postback: ResourcePostback) -> Self {
        self.postbacks.push(postback);
        self
    }
}

/// Result of a single dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(TaskOutput),
    /// Not done yet; poll again after the delay
    RetryAfter(Duration),
    Failed(ProviderError),
}

impl TaskOutcome {
    pub fn completed(data: Value) -> Self {
        Self::Completed(TaskOutput::new(data))
    }
}

/// Executes provider calls on behalf of the engine
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn dispatch(&self, call: &TaskCall, context: &RequestContext) -> TaskOutcome;
}

/// Shared flag asking a running workflow to stop dispatching
#[derive(Debug, Clone, Default)]
pub struct PauseHandle(Arc<AtomicBool>);

impl PauseHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct WorkflowEngine {
    dispatcher: Arc<dyn TaskDispatcher>,
    postbacks: Option<Arc<dyn PostbackSink>>,
    classifier: Arc<dyn ErrorClassifier>,
    handler: ResetTaskTreeHandler,
    events: EventPublisher,
    config: ExecutionConfig,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("classifier", &self.classifier.classifier_name())
            .field("config", &self.config)
            .finish()
    }
}

impl WorkflowEngine {
    pub fn new(dispatcher: Arc<dyn TaskDispatcher>, config: ExecutionConfig) -> Self {
        Self {
            dispatcher,
            postbacks: None,
            classifier: Arc::new(StandardErrorClassifier::from_config(&config)),
            handler: ResetTaskTreeHandler::new(),
            events: EventPublisher::default(),
            config,
        }
    }

    pub fn with_postback_sink(mut self, sink: Arc<dyn PostbackSink>) -> Self {
        self.postbacks = Some(sink);
        self
    }

    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = events;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub async fn run(&self, workflow: &mut Workflow, context: &RequestContext) -> Result<WorkflowStatus> {
        self.run_with_pause(workflow, context, &PauseHandle::new()).await
    }

    /// Execute until no task can make progress. Returns the derived status.
    #[instrument(skip_all, fields(workflow_id = %workflow.id, workflow_type = ?workflow.workflow_type))]
    pub async fn run_with_pause(
        &self,
        workflow: &mut Workflow,
        context: &RequestContext,
        pause: &PauseHandle,
    ) -> Result<WorkflowStatus> {
        // Stored workflows may have been edited outside this process
        workflow.task_tree.validate()?;
        workflow.attributes.paused = false;
        let root = workflow.task_tree.root();
        workflow.task_tree.get_mut(root)?.state = TaskState::Completed;
        // Calls interrupted by a previous run are dispatched again
        for task in workflow.task_tree.tasks_mut() {
            if task.state == TaskState::Waiting {
                task.state = TaskState::Ready;
            }
        }
        workflow.update_workflow_status();

        log_workflow_operation("run", &workflow.id, None, None, "started", None);
        self.events.publish(
            events::WORKFLOW_STARTED,
            json!({
                "workflow_id": workflow.id,
                "deployment_id": workflow.deployment_id,
                "type": workflow.workflow_type,
                "total": workflow.attributes.total,
            }),
        );

        let mut in_flight: JoinSet<(TaskId, TaskOutcome)> = JoinSet::new();
        let mut delays: HashMap<TaskId, Duration> = HashMap::new();

        loop {
            self.advance(workflow)?;

            if !pause.is_paused() {
                let ready: Vec<TaskId> = workflow
                    .task_tree
                    .tasks()
                    .filter(|t| t.state == TaskState::Ready && matches!(t.kind, TaskKind::Call(_)))
                    .map(|t| t.id)
                    .collect();
                for id in ready {
                    if in_flight.len() >= self.config.max_concurrent_tasks.max(1) {
                        break;
                    }
                    let task = workflow.task_tree.get_mut(id)?;
                    let Some(call) = task.kind.call().cloned() else {
                        continue;
                    };
                    task.state = TaskState::Waiting;
                    task.attempts += 1;
                    task.dispatch_ref = Some(Uuid::new_v4().to_string());
                    debug!(task_id = %id, task_name = %task.name, attempt = task.attempts, "Dispatching task");

                    let delay = delays.remove(&id).unwrap_or_default();
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let context = context.clone();
                    in_flight.spawn(async move {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        let outcome = dispatcher.dispatch(&call, &context).await;
                        (id, outcome)
                    });
                }
            }
            workflow.update_workflow_status();

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (id, outcome) = joined
                .map_err(|e| DeployerError::Internal(format!("Task dispatch aborted: {e}")))?;
            self.apply_outcome(workflow, id, outcome, &mut delays).await?;
            self.report_progress(workflow).await;
        }

        let unfinished = workflow
            .task_tree
            .tasks()
            .any(|t| matches!(t.state, TaskState::Future | TaskState::Ready));
        workflow.attributes.paused = pause.is_paused() && unfinished;
        let status = workflow.update_workflow_status();
        workflow.updated_at = Utc::now();

        let event = if status == WorkflowStatus::Paused {
            events::WORKFLOW_PAUSED
        } else {
            events::WORKFLOW_COMPLETED
        };
        self.events.publish(
            event,
            json!({
                "workflow_id": workflow.id,
                "deployment_id": workflow.deployment_id,
                "status": status,
                "progress": workflow.attributes.progress,
            }),
        );
        info!(
            status = %status,
            progress = workflow.attributes.progress,
            completed = workflow.attributes.completed,
            total = workflow.attributes.total,
            "Workflow run finished"
        );
        Ok(status)
    }

    /// Promote satisfied FUTURE tasks and complete structural ones until stable
    fn advance(&self, workflow: &mut Workflow) -> Result<()> {
        loop {
            let mut changed = false;
            for index in 0..workflow.task_tree.len() {
                let id = TaskId(index);
                let state = workflow.task_tree.get(id)?.state;
                if state != TaskState::Future || !workflow.task_tree.inputs_satisfied(id) {
                    continue;
                }
                let task = workflow.task_tree.get_mut(id)?;
                task.state = if task.kind.is_structural() {
                    TaskState::Completed
                } else {
                    TaskState::Ready
                };
                changed = true;
            }
            if !changed {
                return Ok(());
            }
        }
    }

    async fn apply_outcome(
        &self,
        workflow: &mut Workflow,
        id: TaskId,
        outcome: TaskOutcome,
        delays: &mut HashMap<TaskId, Duration>,
    ) -> Result<()> {
        match outcome {
            TaskOutcome::Completed(output) => {
                if let Err(e) = self.deliver_postbacks(workflow, &output.postbacks).await {
                    let name = workflow.task_tree.get(id)?.name.clone();
                    warn!(task_id = %id, task_name = %name, error = %e, "Postback rejected, failing task");
                    let error = ProviderError::transient(format!(
                        "Result of task '{name}' could not be recorded: {e}"
                    ));
                    return self.fail_task(workflow, id, &error, None);
                }

                let task = workflow.task_tree.get_mut(id)?;
                task.state = TaskState::Completed;
                task.result = Some(output.data);
                task.exception = None;
                task.dispatch_ref = None;
                let name = task.name.clone();
                workflow.complete_sub_workflows(id);

                workflow.update_workflow_status();
                self.events.publish(
                    events::TASK_COMPLETED,
                    json!({
                        "workflow_id": workflow.id,
                        "task_id": id,
                        "task_name": name,
                        "progress": workflow.attributes.progress,
                    }),
                );
            }
            TaskOutcome::RetryAfter(delay) => {
                let task = workflow.task_tree.get_mut(id)?;
                task.polls += 1;
                if task.polls > self.config.max_wait_polls {
                    let error = ProviderError::resumable(format!(
                        "Task '{}' still waiting after {} polls",
                        task.name, self.config.max_wait_polls
                    ));
                    self.fail_task(workflow, id, &error, None)?;
                } else {
                    task.state = TaskState::Ready;
                    debug!(task_id = %id, polls = task.polls, delay_ms = delay.as_millis() as u64, "Task not ready, polling again");
                    delays.insert(id, delay);
                    self.publish_rescheduled(workflow, id, delay);
                }
            }
            TaskOutcome::Failed(error) => {
                let task = workflow.task_tree.get(id)?;
                let error_context = ErrorContext {
                    task_id: id,
                    task_name: task.name.clone(),
                    provider: task.kind.call().map(|c| c.provider.clone()).unwrap_or_default(),
                    attempt_number: task.attempts,
                    max_attempts: self.config.max_attempts,
                    polls: task.polls,
                    max_polls: self.config.max_wait_polls,
                };
                let classification = self.classifier.classify_error(&error, &error_context);

                if classification.is_resumable || classification.is_retryable {
                    let delay = classification.retry_delay.unwrap_or_default();
                    let task = workflow.task_tree.get_mut(id)?;
                    task.state = TaskState::Ready;
                    if classification.is_resumable {
                        task.polls += 1;
                    }
                    warn!(
                        task_id = %id,
                        category = %classification.error_category,
                        delay_ms = delay.as_millis() as u64,
                        "{}",
                        classification.error_message
                    );
                    delays.insert(id, delay);
                    self.publish_rescheduled(workflow, id, delay);
                } else {
                    let help = classification.remediation_suggestions.first().cloned();
                    self.fail_task(workflow, id, &error, help)?;
                }
            }
        }
        Ok(())
    }

    async fn deliver_postbacks(&self, workflow: &Workflow, postbacks: &[ResourcePostback]) -> Result<()> {
        match &self.postbacks {
            Some(sink) if !postbacks.is_empty() => sink.apply(&workflow.deployment_id, postbacks).await,
            _ => Ok(()),
        }
    }

    /// Hand the current operation summary to the sink. The run is still going,
    /// so the summary reads IN PROGRESS whatever the derived status; the final
    /// status is recorded by the caller. Failures are logged and the run
    /// continues.
    async fn report_progress(&self, workflow: &Workflow) {
        let Some(sink) = &self.postbacks else {
            return;
        };
        let mut operation = workflow.to_operation();
        operation.status = WorkflowStatus::InProgress;
        if let Err(e) = sink.record_operation(&workflow.deployment_id, &operation).await {
            warn!(workflow_id = %workflow.id, error = %e, "Operation progress could not be saved");
        }
    }

    fn fail_task(
        &self,
        workflow: &mut Workflow,
        id: TaskId,
        error: &ProviderError,
        help: Option<String>,
    ) -> Result<()> {
        let task = workflow.task_tree.get_mut(id)?;
        task.state = TaskState::Error;
        task.dispatch_ref = None;
        task.exception = Some(TaskException {
            error_type: error.error_type().to_string(),
            error_message: error.message.clone(),
            error_help: help,
            friendly_message: error.friendly_message.clone(),
            retriable: error.kind == ProviderErrorKind::Transient,
            resumable: error.kind == ProviderErrorKind::Resumable,
            traceback: error.traceback.clone(),
        });
        let name = task.name.clone();
        workflow.fail_sub_workflows(id);

        log_workflow_operation(
            "task_failed",
            &workflow.id,
            Some(id.0),
            Some(&name),
            error.error_type(),
            Some(&error.message),
        );
        self.events.publish(
            events::TASK_FAILED,
            json!({
                "workflow_id": workflow.id,
                "task_id": id,
                "task_name": name,
                "error_type": error.error_type(),
                "error_message": error.message,
            }),
        );

        match self.handler.handle(workflow, id)? {
            ResetOutcome::Reset(sub) => {
                self.events.publish(
                    events::TASK_RESET,
                    json!({
                        "workflow_id": workflow.id,
                        "task_id": id,
                        "sub_workflow_id": sub.id,
                        "attempt": sub.attempt,
                        "reset_tasks": sub.reset_tasks,
                    }),
                );
            }
            other => {
                debug!(task_id = %id, outcome = ?other, "Task left in error");
                workflow.update_workflow_status();
            }
        }
        Ok(())
    }

    fn publish_rescheduled(&self, workflow: &Workflow, id: TaskId, delay: Duration) {
        self.events.publish(
            events::TASK_RESCHEDULED,
            json!({
                "workflow_id": workflow.id,
                "task_id": id,
                "delay_ms": delay.as_millis() as u64,
            }),
        );
    }
}
