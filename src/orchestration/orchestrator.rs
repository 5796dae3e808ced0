//! # Orchestrator
//!
//! Facade tying the planner, spec builder, execution engine and store
//! together for one process.
//!
//! ## Lifecycle
//!
//! ```text
//! create_deployment ─▶ plan ─▶ deploy ─▶ run_workflow ─▶ UP | FAILED
//!                                   │          ▲
//!                                   │          ├── retry_workflow (manual reset)
//!                                   │          └── resume_task
//!                      delete_deployment ──────┘ ─▶ DELETED
//! ```
//!
//! A run first claims the deployment's `operation` for its workflow (IN
//! PROGRESS), keeps it current after every task outcome and ends by folding the
//! final summary (and, when terminal, the matching status transition) into the
//! deployment. A workflow that has been superseded, such as a build paused by a
//! delete, only updates its archived entry in `operations_history`.
//! Deployment writes go through compare-and-swap with bounded retries because
//! postbacks from the same run may have landed in between.

use crate::cache::CacheService;
use crate::config::OrchestratorConfig;
use crate::constants::system::DEFAULT_EVENT_CHANNEL_CAPACITY;
use crate::constants::{events, DELETABLE_STATUSES, PAUSE_WORKFLOW_OPERATION, WORKFLOW_PROVIDER};
use crate::error::{DeployerError, ProviderError, Result};
use crate::events::{EventPublisher, PublishedEvent};
use crate::logging::{log_deployment_operation, log_error};
use crate::models::{Deployment, Operation, RequestContext, WorkflowType};
use crate::persistence::{update_deployment, DeploymentStore};
use crate::planning::{PlanOptions, Planner};
use crate::providers::{CatalogService, ProviderRegistry};
use crate::state_machine::{
    DeploymentEvent, DeploymentStateMachine, DeploymentStatus, TaskState, WorkflowStatus,
};
use crate::workflow::{
    apply_postbacks, PauseHandle, PostbackSink, ResetOutcome, ResetTaskTreeHandler,
    ResourcePostback, TaskCall, TaskDispatcher, TaskId, TaskOutcome, Workflow, WorkflowEngine,
    WorkflowSpecBuilder,
};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

/// Pause flags of workflows currently executing in this process
type PauseFlags = Arc<DashMap<String, PauseHandle>>;

pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn DeploymentStore>,
    planner: Planner,
    spec_builder: WorkflowSpecBuilder,
    handler: ResetTaskTreeHandler,
    events: EventPublisher,
    pause_flags: PauseFlags,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("providers", &self.registry.keys())
            .field("running", &self.pause_flags.len())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<ProviderRegistry>,
        store: Arc<dyn DeploymentStore>,
        cache: Arc<dyn CacheService>,
    ) -> Result<Self> {
        config.validate()?;
        let events = EventPublisher::new(DEFAULT_EVENT_CHANNEL_CAPACITY);
        let catalog = Arc::new(CatalogService::new(cache, &config.cache));
        let planner = Planner::new(Arc::clone(&registry), catalog, config.planner.clone())
            .with_events(events.clone());
        let spec_builder = WorkflowSpecBuilder::new(Arc::clone(&registry), config.workflow.clone());

        info!(providers = registry.len(), "Orchestrator initialized");
        Ok(Self {
            config,
            registry,
            store,
            planner,
            spec_builder,
            handler: ResetTaskTreeHandler::new(),
            events,
            pause_flags: Arc::new(DashMap::new()),
        })
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.events.subscribe()
    }

    pub async fn get_deployment(&self, id: &str) -> Result<Deployment> {
        self.store.get_deployment(id).await
    }

    pub async fn get_workflow(&self, id: &str) -> Result<Workflow> {
        self.store.get_workflow(id).await
    }

    /// Persist a NEW deployment
    pub async fn create_deployment(&self, deployment: Deployment, secrets: Option<Value>) -> Result<Deployment> {
        if deployment.status != DeploymentStatus::New {
            return Err(DeployerError::StateError(format!(
                "Deployment {} must be NEW to be created, not {}",
                deployment.id, deployment.status
            )));
        }
        let saved = self
            .store
            .save_deployment(&deployment.id, &deployment, secrets, &deployment.tenant_id)
            .await?;
        log_deployment_operation("create", &saved.id, Some(&saved.tenant_id), &saved.status.to_string(), None);
        Ok(saved)
    }

    pub async fn plan(&self, deployment_id: &str, context: &RequestContext) -> Result<Deployment> {
        self.plan_with_options(deployment_id, context, PlanOptions::from(&self.config.planner))
            .await
    }

    pub async fn plan_with_options(
        &self,
        deployment_id: &str,
        context: &RequestContext,
        options: PlanOptions,
    ) -> Result<Deployment> {
        let mut deployment = self.store.get_deployment(deployment_id).await?;
        self.planner
            .plan_with_options(&mut deployment, context, options)
            .await?;
        let saved = self
            .store
            .save_deployment(deployment_id, &deployment, None, &deployment.tenant_id)
            .await?;
        self.publish_status(&saved.id, DeploymentStatus::New, saved.status);
        Ok(saved)
    }

    /// Plan if needed, build the BUILD workflow and run it
    #[instrument(skip(self, context))]
    pub async fn deploy(&self, deployment_id: &str, context: &RequestContext) -> Result<Workflow> {
        let mut deployment = self.store.get_deployment(deployment_id).await?;
        if deployment.status == DeploymentStatus::New {
            deployment = self.plan(deployment_id, context).await?;
        }
        if !matches!(deployment.status, DeploymentStatus::Planned | DeploymentStatus::Failed) {
            return Err(DeployerError::StateError(format!(
                "Deployment {} is {}; only PLANNED or FAILED deployments can be deployed",
                deployment.id, deployment.status
            )));
        }
        ensure_no_running_operation(&deployment)?;

        let task_tree = self.spec_builder.build_deploy_spec(&deployment, context)?;
        let workflow = Workflow::new(&deployment.tenant_id, &deployment.id, WorkflowType::Build, task_tree);
        self.start(workflow, context).await
    }

    /// Build the DELETE workflow and run it. A deployment with a build still in
    /// progress gets that build paused first.
    #[instrument(skip(self, context))]
    pub async fn delete_deployment(&self, deployment_id: &str, context: &RequestContext) -> Result<Workflow> {
        let deployment = self.store.get_deployment(deployment_id).await?;
        if !DELETABLE_STATUSES.contains(&deployment.status) {
            return Err(DeployerError::StateError(format!(
                "Deployment {} is {} and cannot be deleted",
                deployment.id, deployment.status
            )));
        }

        let task_tree = self.spec_builder.build_delete_spec(&deployment, context)?;
        let workflow = Workflow::new(&deployment.tenant_id, &deployment.id, WorkflowType::Delete, task_tree);
        self.start(workflow, context).await
    }

    pub async fn run_workflow(&self, workflow_id: &str, context: &RequestContext) -> Result<Workflow> {
        let workflow = self.store.get_workflow(workflow_id).await?;
        self.execute(workflow, context).await
    }

    /// Operator retry: rewind every errored task's chain regardless of the
    /// automatic budget, then run again
    #[instrument(skip(self, context))]
    pub async fn retry_workflow(&self, workflow_id: &str, context: &RequestContext) -> Result<Workflow> {
        let mut workflow = self.store.get_workflow(workflow_id).await?;
        if !matches!(workflow.status(), WorkflowStatus::Error | WorkflowStatus::Failed) {
            return Err(DeployerError::StateError(format!(
                "Workflow {workflow_id} is {}; only ERROR or FAILED workflows can be retried",
                workflow.status()
            )));
        }
        let errored: Vec<TaskId> = workflow
            .task_tree
            .tasks()
            .filter(|t| t.state == TaskState::Error)
            .map(|t| t.id)
            .collect();
        let mut reset = 0usize;
        for task_id in errored {
            match self.handler.reset_manual(&mut workflow, task_id)? {
                ResetOutcome::Reset(_) => reset += 1,
                other => debug!(task_id = %task_id, outcome = ?other, "Task not reset"),
            }
        }
        info!(workflow_id = %workflow_id, reset = reset, "Manual retry requested");
        let saved = self
            .store
            .save_workflow(workflow_id, &workflow, None, &workflow.tenant_id)
            .await?;
        self.execute(saved, context).await
    }

    /// Re-run one resumable task and continue the workflow
    pub async fn resume_task(
        &self,
        workflow_id: &str,
        task_id: TaskId,
        context: &RequestContext,
    ) -> Result<Workflow> {
        let mut workflow = self.store.get_workflow(workflow_id).await?;
        self.handler.resume_task(&mut workflow, task_id)?;
        let saved = self
            .store
            .save_workflow(workflow_id, &workflow, None, &workflow.tenant_id)
            .await?;
        self.execute(saved, context).await
    }

    /// Stop dispatching new tasks for `workflow_id`. A workflow running in this
    /// process finishes its in-flight calls and reports PAUSED; an idle one is
    /// marked paused in the store. Returns whether a running workflow was
    /// signalled.
    pub async fn pause_workflow(&self, workflow_id: &str) -> Result<bool> {
        if let Some(handle) = self.pause_flags.get(workflow_id) {
            handle.pause();
            info!(workflow_id = %workflow_id, "Pause requested for running workflow");
            return Ok(true);
        }

        let mut workflow = self.store.get_workflow(workflow_id).await?;
        if workflow.status().is_terminal() {
            return Err(DeployerError::StateError(format!(
                "Workflow {workflow_id} is {} and cannot be paused",
                workflow.status()
            )));
        }
        workflow.attributes.paused = true;
        workflow.update_workflow_status();
        let saved = self
            .store
            .save_workflow(workflow_id, &workflow, None, &workflow.tenant_id)
            .await?;
        self.sync_deployment(&saved).await?;
        Ok(false)
    }

    async fn start(&self, workflow: Workflow, context: &RequestContext) -> Result<Workflow> {
        let saved = self
            .store
            .save_workflow(&workflow.id, &workflow, None, &workflow.tenant_id)
            .await?;
        log_deployment_operation(
            &format!("{}_workflow", saved.workflow_type).to_lowercase(),
            &saved.deployment_id,
            Some(&saved.tenant_id),
            "started",
            Some(&saved.id),
        );
        self.execute(saved, context).await
    }

    async fn execute(&self, mut workflow: Workflow, context: &RequestContext) -> Result<Workflow> {
        let deployment = self.store.get_deployment(&workflow.deployment_id).await?;
        if workflow.workflow_type == WorkflowType::Build && deployment.status == DeploymentStatus::Deleted {
            return Err(DeployerError::StateError(format!(
                "Deployment {} is DELETED; build workflow {} cannot run",
                deployment.id, workflow.id
            )));
        }

        // Registered before the operation is visible so a pause request
        // always finds the running workflow
        let pause = self
            .pause_flags
            .entry(workflow.id.clone())
            .or_default()
            .clone();
        pause.resume();
        if let Err(e) = self.claim_operation(&workflow).await {
            self.pause_flags.remove(&workflow.id);
            return Err(e);
        }

        let engine = self.engine(&workflow.tenant_id);
        let run = engine.run_with_pause(&mut workflow, context, &pause).await;
        self.pause_flags.remove(&workflow.id);
        if let Err(e) = &run {
            log_error("orchestrator", "run_workflow", &e.to_string(), Some(&workflow.id));
        }
        // Persist whatever progress was made before surfacing a run error
        let saved = self
            .store
            .save_workflow(&workflow.id, &workflow, None, &workflow.tenant_id)
            .await?;
        run?;
        self.sync_deployment(&saved).await?;
        Ok(saved)
    }

    /// Make `workflow` the deployment's current operation, IN PROGRESS
    async fn claim_operation(&self, workflow: &Workflow) -> Result<()> {
        let mut operation = workflow.to_operation();
        operation.status = WorkflowStatus::InProgress;
        update_deployment(
            self.store.as_ref(),
            &workflow.deployment_id,
            &workflow.tenant_id,
            |deployment| {
                deployment.set_operation(operation.clone());
                Ok(())
            },
        )
        .await?;
        debug!(workflow_id = %workflow.id, deployment_id = %workflow.deployment_id, "Operation claimed");
        Ok(())
    }

    fn engine(&self, tenant_id: &str) -> WorkflowEngine {
        let dispatcher = Arc::new(OrchestratorDispatcher {
            registry: Arc::clone(&self.registry),
            pause_flags: Arc::clone(&self.pause_flags),
            poll_interval: self.config.execution.resume_delay(),
        });
        let sink = Arc::new(StorePostbackSink {
            store: Arc::clone(&self.store),
            tenant_id: tenant_id.to_string(),
        });
        WorkflowEngine::new(dispatcher, self.config.execution.clone())
            .with_postback_sink(sink)
            .with_events(self.events.clone())
    }

    /// Fold the workflow's operation summary into its deployment and, while it
    /// is still the current operation, apply the status transition a terminal
    /// run implies
    async fn sync_deployment(&self, workflow: &Workflow) -> Result<Deployment> {
        let operation = workflow.to_operation();
        let mut previous = None;
        let deployment = update_deployment(
            self.store.as_ref(),
            &workflow.deployment_id,
            &workflow.tenant_id,
            |deployment| {
                previous = Some(deployment.status);
                if !deployment.record_operation(operation.clone()) {
                    debug!(workflow_id = %operation.workflow_id, "Superseded operation archived");
                    return Ok(());
                }
                if let Some(event) = completion_event(&operation, deployment.status) {
                    DeploymentStateMachine::transition(deployment, event)?;
                }
                Ok(())
            },
        )
        .await?;

        if let Some(previous) = previous {
            self.publish_status(&deployment.id, previous, deployment.status);
        }
        log_deployment_operation(
            "sync_operation",
            &deployment.id,
            Some(&deployment.tenant_id),
            &deployment.status.to_string(),
            Some(&format!("{} {} at {}%", operation.op_type, operation.status, operation.progress)),
        );
        Ok(deployment)
    }

    fn publish_status(&self, deployment_id: &str, from: DeploymentStatus, to: DeploymentStatus) {
        if from == to {
            return;
        }
        self.events.publish(
            events::DEPLOYMENT_STATUS_CHANGED,
            json!({
                "deployment_id": deployment_id,
                "from": from,
                "to": to,
            }),
        );
    }
}

fn ensure_no_running_operation(deployment: &Deployment) -> Result<()> {
    match &deployment.operation {
        Some(op) if op.status == WorkflowStatus::InProgress => Err(DeployerError::StateError(format!(
            "Deployment {} already has workflow {} in progress",
            deployment.id, op.workflow_id
        ))),
        _ => Ok(()),
    }
}

/// Status event implied by a finished operation, if any
fn completion_event(operation: &Operation, current: DeploymentStatus) -> Option<DeploymentEvent> {
    match (operation.op_type, operation.status) {
        (WorkflowType::Build, WorkflowStatus::Complete) if current != DeploymentStatus::Up => {
            Some(DeploymentEvent::Complete)
        }
        (WorkflowType::Delete, WorkflowStatus::Complete) if current != DeploymentStatus::Deleted => {
            Some(DeploymentEvent::Delete)
        }
        (_, WorkflowStatus::Failed)
            if !matches!(current, DeploymentStatus::Failed | DeploymentStatus::Deleted) =>
        {
            let reason = operation
                .error_details
                .first()
                .map(|e| format!("{}: {}", e.task_name, e.error_message))
                .unwrap_or_else(|| format!("Workflow {} failed", operation.workflow_id));
            Some(DeploymentEvent::Fail(reason))
        }
        _ => None,
    }
}

/// Runs orchestrator-owned tasks in-process and hands the rest to providers
struct OrchestratorDispatcher {
    registry: Arc<ProviderRegistry>,
    pause_flags: PauseFlags,
    /// Re-check interval while a paused workflow drains its in-flight calls
    poll_interval: Duration,
}

#[async_trait]
impl TaskDispatcher for OrchestratorDispatcher {
    async fn dispatch(&self, call: &TaskCall, context: &RequestContext) -> TaskOutcome {
        if call.provider != WORKFLOW_PROVIDER {
            return self.registry.dispatch(call, context).await;
        }
        if call.operation != PAUSE_WORKFLOW_OPERATION {
            return TaskOutcome::Failed(ProviderError::fatal(format!(
                "Unknown workflow operation '{}'",
                call.operation
            )));
        }
        let Some(target) = call.params.get("workflow_id").and_then(Value::as_str) else {
            return TaskOutcome::Failed(ProviderError::fatal("pause_workflow requires a workflow_id"));
        };
        // Done only once the target run has returned; its in-flight calls may
        // still create resources until then
        if let Some(handle) = self.pause_flags.get(target) {
            handle.pause();
            debug!(workflow_id = %target, "Waiting for paused workflow to stop");
            return TaskOutcome::RetryAfter(self.poll_interval);
        }
        info!(workflow_id = %target, "Workflow stopped ahead of delete");
        TaskOutcome::completed(json!({"workflow_id": target, "running": false}))
    }
}

/// Writes postbacks into the stored deployment with compare-and-swap retries
struct StorePostbackSink {
    store: Arc<dyn DeploymentStore>,
    tenant_id: String,
}

#[async_trait]
impl PostbackSink for StorePostbackSink {
    async fn apply(&self, deployment_id: &str, postbacks: &[ResourcePostback]) -> Result<()> {
        let saved = update_deployment(self.store.as_ref(), deployment_id, &self.tenant_id, |deployment| {
            apply_postbacks(deployment, postbacks)
        })
        .await;
        if let Err(e) = &saved {
            warn!(deployment_id = %deployment_id, error = %e, "Postback could not be saved");
        }
        saved.map(|_| ())
    }

    async fn record_operation(&self, deployment_id: &str, operation: &Operation) -> Result<()> {
        update_deployment(self.store.as_ref(), deployment_id, &self.tenant_id, |deployment| {
            deployment.record_operation(operation.clone());
            Ok(())
        })
        .await
        .map(|_| ())
    }
}
