//! End-to-end lifecycle through the orchestrator facade

mod common;

use common::*;
use deployer_core::constants::events;
use deployer_core::error::{DeployerError, ProviderError};
use deployer_core::models::WorkflowType;
use deployer_core::state_machine::{DeploymentStatus, ResourceStatus, WorkflowStatus};
use deployer_core::workflow::TaskOutcome;
use deployer_core::DeploymentStore;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_deploy_brings_deployment_up() {
    let providers = providers();
    let (orchestrator, store) = orchestrator(&providers.registry);
    let mut receiver = orchestrator.subscribe();
    orchestrator
        .create_deployment(deployment("dep-up", db_blueprint()), Some(json!({"password": "x"})))
        .await
        .unwrap();

    let workflow = orchestrator.deploy("dep-up", &context()).await.unwrap();

    assert_eq!(workflow.workflow_type, WorkflowType::Build);
    assert_eq!(workflow.status(), WorkflowStatus::Complete);
    assert_eq!(workflow.attributes.progress, 100);

    let deployment = orchestrator.get_deployment("dep-up").await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Up);
    let operation = deployment.operation.as_ref().unwrap();
    assert_eq!(operation.workflow_id, workflow.id);
    assert_eq!(operation.status, WorkflowStatus::Complete);
    assert_eq!(deployment.resources["0"].status, ResourceStatus::Active);
    assert_eq!(deployment.resources["0"].instance["id"], json!("nova-0"));
    assert_eq!(deployment.resources["1"].instance["id"], json!("cbs-1"));
    assert!(store.has_secrets("dep-up"));

    let transitions: Vec<_> = drain(&mut receiver)
        .into_iter()
        .filter(|e| e.name == events::DEPLOYMENT_STATUS_CHANGED)
        .map(|e| e.context["to"].clone())
        .collect();
    assert_eq!(
        transitions,
        vec![
            serde_json::to_value(DeploymentStatus::Planned).unwrap(),
            serde_json::to_value(DeploymentStatus::Up).unwrap(),
        ]
    );
}

#[tokio::test]
async fn test_failed_build_marks_deployment_failed_then_retry_recovers() {
    let providers = providers();
    providers.script.push(
        "create_volume",
        TaskOutcome::Failed(ProviderError::fatal("volume type unavailable")),
    );
    let (orchestrator, _store) = orchestrator(&providers.registry);
    orchestrator
        .create_deployment(deployment("dep-fail", db_blueprint()), None)
        .await
        .unwrap();

    let workflow = orchestrator.deploy("dep-fail", &context()).await.unwrap();
    assert_eq!(workflow.status(), WorkflowStatus::Failed);

    let deployment = orchestrator.get_deployment("dep-fail").await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Failed);
    let operation = deployment.operation.as_ref().unwrap();
    assert_eq!(operation.errors, 1);
    assert_eq!(operation.error_details[0].task_name, "Create Volume");
    assert_eq!(operation.error_details[0].resource_key.as_deref(), Some("1"));

    let retried = orchestrator.retry_workflow(&workflow.id, &context()).await.unwrap();
    assert_eq!(retried.id, workflow.id);
    assert_eq!(retried.status(), WorkflowStatus::Complete);
    assert_eq!(retried.attributes.sub_workflows.len(), 1);
    assert_eq!(providers.script.count("create_volume"), 2);

    let deployment = orchestrator.get_deployment("dep-fail").await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Up);
}

#[tokio::test]
async fn test_retry_rejects_complete_workflow() {
    let providers = providers();
    let (orchestrator, _store) = orchestrator(&providers.registry);
    orchestrator
        .create_deployment(deployment("dep-1", db_blueprint()), None)
        .await
        .unwrap();
    let workflow = orchestrator.deploy("dep-1", &context()).await.unwrap();

    let err = orchestrator.retry_workflow(&workflow.id, &context()).await.unwrap_err();
    assert!(matches!(err, DeployerError::StateError(_)));
}

#[tokio::test]
async fn test_delete_tears_everything_down() {
    let providers = providers();
    let (orchestrator, _store) = orchestrator(&providers.registry);
    orchestrator
        .create_deployment(deployment("dep-del", db_blueprint()), None)
        .await
        .unwrap();
    let build = orchestrator.deploy("dep-del", &context()).await.unwrap();

    let delete = orchestrator.delete_deployment("dep-del", &context()).await.unwrap();

    assert_eq!(delete.workflow_type, WorkflowType::Delete);
    assert_eq!(delete.status(), WorkflowStatus::Complete);
    assert!(delete.task_tree.find_by_name("Pause Workflow").is_none());
    let dispatched = providers.script.dispatched();
    let detach = dispatched.iter().position(|d| d == "detach_volume:0").unwrap();
    let delete_volume = dispatched.iter().position(|d| d == "delete_volume:1").unwrap();
    assert!(detach < delete_volume);

    let deployment = orchestrator.get_deployment("dep-del").await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Deleted);
    assert!(deployment
        .resources
        .values()
        .all(|r| r.status == ResourceStatus::Deleted));
    assert_eq!(deployment.operations_history.len(), 1);
    assert_eq!(deployment.operations_history[0].workflow_id, build.id);

    let err = orchestrator.delete_deployment("dep-del", &context()).await.unwrap_err();
    assert!(matches!(err, DeployerError::StateError(_)));
}

#[tokio::test]
async fn test_lifecycle_guards() {
    let providers = providers();
    let (orchestrator, _store) = orchestrator(&providers.registry);
    orchestrator
        .create_deployment(deployment("dep-1", db_blueprint()), None)
        .await
        .unwrap();

    // NEW deployments have nothing to delete
    let err = orchestrator.delete_deployment("dep-1", &context()).await.unwrap_err();
    assert!(matches!(err, DeployerError::StateError(_)));

    let planned = orchestrator.plan("dep-1", &context()).await.unwrap();
    assert_eq!(planned.status, DeploymentStatus::Planned);
    assert_eq!(planned.resources.len(), 2);
    let err = orchestrator
        .create_deployment(planned.clone(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DeployerError::StateError(_)));

    orchestrator.deploy("dep-1", &context()).await.unwrap();
    let err = orchestrator.deploy("dep-1", &context()).await.unwrap_err();
    assert!(matches!(err, DeployerError::StateError(_)));

    let err = orchestrator.get_deployment("missing").await.unwrap_err();
    assert!(matches!(err, DeployerError::NotFound { .. }));
}

#[tokio::test]
async fn test_pause_running_workflow_then_resume() {
    let providers = providers();
    providers
        .script
        .push("create_volume", TaskOutcome::RetryAfter(Duration::from_millis(300)));
    let (orchestrator, store) = orchestrator(&providers.registry);
    orchestrator
        .create_deployment(deployment("dep-pause", db_blueprint()), None)
        .await
        .unwrap();

    let pauser = async {
        for _ in 0..100 {
            let deployment = store.get_deployment("dep-pause").await.unwrap();
            if let Some(operation) = deployment.operation {
                return orchestrator.pause_workflow(&operation.workflow_id).await.unwrap();
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        false
    };
    let ctx = context();
    let (workflow, signalled) = tokio::join!(orchestrator.deploy("dep-pause", &ctx), pauser);
    let workflow = workflow.unwrap();

    assert!(signalled);
    assert_eq!(workflow.status(), WorkflowStatus::Paused);
    assert!(workflow.attributes.paused);
    assert_eq!(providers.script.count("create_server"), 0);
    let deployment = orchestrator.get_deployment("dep-pause").await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Planned);
    assert_eq!(deployment.operation.unwrap().status, WorkflowStatus::Paused);

    let resumed = orchestrator.run_workflow(&workflow.id, &context()).await.unwrap();
    assert_eq!(resumed.status(), WorkflowStatus::Complete);
    let deployment = orchestrator.get_deployment("dep-pause").await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Up);
}

#[tokio::test]
async fn test_delete_during_build_pauses_the_build_first() {
    let providers = providers();
    providers
        .script
        .push("create_volume", TaskOutcome::RetryAfter(Duration::from_millis(150)));
    let (orchestrator, store) = orchestrator(&providers.registry);
    orchestrator
        .create_deployment(deployment("dep-race", db_blueprint()), None)
        .await
        .unwrap();
    orchestrator.plan("dep-race", &context()).await.unwrap();

    let ctx = context();
    let deleter = async {
        for _ in 0..100 {
            let deployment = store.get_deployment("dep-race").await.unwrap();
            let running = deployment
                .operation
                .as_ref()
                .is_some_and(|op| op.status == WorkflowStatus::InProgress);
            if running {
                return orchestrator.delete_deployment("dep-race", &ctx).await;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("build operation never reported IN PROGRESS");
    };
    let (build, delete) = tokio::join!(orchestrator.deploy("dep-race", &ctx), deleter);
    let build = build.unwrap();
    let delete = delete.unwrap();

    assert_eq!(build.status(), WorkflowStatus::Paused);
    assert!(delete.task_tree.find_by_name("Pause Workflow").is_some());
    assert_eq!(delete.status(), WorkflowStatus::Complete);

    // Nothing from the build runs once teardown has started
    let dispatched = providers.script.dispatched();
    let teardown = dispatched
        .iter()
        .position(|d| d.starts_with("detach_volume"))
        .unwrap();
    assert!(dispatched[teardown..].iter().all(|d| {
        !d.starts_with("create_") && !d.starts_with("wait_for_build") && !d.starts_with("attach_")
    }));
    assert_eq!(providers.script.count("create_server"), 0);

    let deployment = orchestrator.get_deployment("dep-race").await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Deleted);
    assert!(deployment
        .resources
        .values()
        .all(|r| r.status == ResourceStatus::Deleted));
    assert_eq!(deployment.operation.as_ref().unwrap().workflow_id, delete.id);
    assert_eq!(deployment.operations_history.len(), 1);
    assert_eq!(deployment.operations_history[0].workflow_id, build.id);
    assert_eq!(deployment.operations_history[0].status, WorkflowStatus::Paused);
}

#[tokio::test]
async fn test_running_build_reports_in_progress() {
    let providers = providers();
    providers
        .script
        .push("wait_for_build", TaskOutcome::RetryAfter(Duration::from_millis(50)));
    let (orchestrator, store) = orchestrator(&providers.registry);
    orchestrator
        .create_deployment(deployment("dep-progress", db_blueprint()), None)
        .await
        .unwrap();

    let ctx = context();
    let watcher = async {
        let mut seen = Vec::new();
        for _ in 0..40 {
            let deployment = store.get_deployment("dep-progress").await.unwrap();
            if let Some(op) = deployment.operation {
                if op.status == WorkflowStatus::InProgress {
                    seen.push(op.progress);
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        seen
    };
    let (workflow, seen) = tokio::join!(orchestrator.deploy("dep-progress", &ctx), watcher);
    let workflow = workflow.unwrap();

    assert_eq!(workflow.status(), WorkflowStatus::Complete);
    assert!(!seen.is_empty());
    assert!(seen.iter().any(|p| *p > 0));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    let deployment = orchestrator.get_deployment("dep-progress").await.unwrap();
    assert_eq!(deployment.operation.unwrap().status, WorkflowStatus::Complete);
}

#[tokio::test]
async fn test_pause_terminal_workflow_is_rejected() {
    let providers = providers();
    let (orchestrator, _store) = orchestrator(&providers.registry);
    orchestrator
        .create_deployment(deployment("dep-1", db_blueprint()), None)
        .await
        .unwrap();
    let workflow = orchestrator.deploy("dep-1", &context()).await.unwrap();

    let err = orchestrator.pause_workflow(&workflow.id).await.unwrap_err();
    assert!(matches!(err, DeployerError::StateError(_)));
}

#[tokio::test]
async fn test_resumable_failure_can_be_resumed() {
    let providers = providers();
    providers.script.push(
        "wait_for_build",
        TaskOutcome::Failed(ProviderError::resumable("volume still building")),
    );
    let (orchestrator, _store) = orchestrator(&providers.registry);
    orchestrator
        .create_deployment(deployment("dep-resume", db_blueprint()), None)
        .await
        .unwrap();

    // Resumable errors are rescheduled by the engine while polls remain
    let workflow = orchestrator.deploy("dep-resume", &context()).await.unwrap();
    assert_eq!(workflow.status(), WorkflowStatus::Complete);
    assert_eq!(providers.script.count("wait_for_build"), 3);
    let wait = workflow.task_tree.find_by_name("Wait for Volume build").unwrap();
    assert_eq!(workflow.task_tree.get(wait).unwrap().polls, 1);

    let err = orchestrator.resume_task(&workflow.id, wait, &context()).await.unwrap_err();
    assert!(matches!(err, DeployerError::StateError(_)));
}
