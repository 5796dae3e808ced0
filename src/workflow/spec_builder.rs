//! # Workflow Spec Builder
//!
//! Turns a planned deployment into the task DAG the engine executes.
//!
//! ## Build
//!
//! Resources are ordered depth-first so every dependency (relation target or
//! host) is handled before the resources that depend on it. Each resource that
//! still needs building gets its provider's task chain, waiting on the final
//! tasks of its dependencies. Host relations are then wired through
//! `add_connection_tasks`, followed by the remaining relations touching a newly
//! planned resource.
//!
//! ## Delete
//!
//! Relation teardown chains run first. Each resource's delete chain waits on the
//! teardown of every relation it takes part in, or hangs directly off the anchor
//! when it has none. The anchor is Start, or a "Pause Workflow" task when the
//! deployment's current operation is still in progress.
//!
//! A DAG with nothing reachable from Start gets a no-op task so it is never
//! empty.

use super::task::{TaskCall, TaskId, TaskKind, TaskProperties, TaskTag};
use super::task_dag::TaskDag;
use crate::config::WorkflowConfig;
use crate::constants::{PAUSE_WORKFLOW_OPERATION, WORKFLOW_PROVIDER};
use crate::error::{DeployerError, Result};
use crate::models::{Deployment, RequestContext, ResourceGraph};
use crate::providers::ProviderRegistry;
use crate::state_machine::{ResourceStatus, WorkflowStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// First and last task of a provider-built chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskChain {
    pub root: TaskId,
    pub final_task: TaskId,
}

impl TaskChain {
    pub fn new(root: TaskId, final_task: TaskId) -> Self {
        Self { root, final_task }
    }

    /// Chain consisting of a single task
    pub fn single(task: TaskId) -> Self {
        Self::new(task, task)
    }
}

#[derive(Debug)]
pub struct WorkflowSpecBuilder {
    registry: Arc<ProviderRegistry>,
    config: WorkflowConfig,
}

impl WorkflowSpecBuilder {
    pub fn new(registry: Arc<ProviderRegistry>, config: WorkflowConfig) -> Self {
        Self { registry, config }
    }

    #[instrument(skip_all, fields(deployment_id = %deployment.id))]
    pub fn build_deploy_spec(&self, deployment: &Deployment, context: &RequestContext) -> Result<TaskDag> {
        let order = build_order(&deployment.resources)?;
        let mut dag = TaskDag::new();
        let start = dag.start();
        let mut chains: HashMap<&str, TaskChain> = HashMap::new();

        for key in &order {
            let resource = &deployment.resources[key.as_str()];
            if !resource.status.needs_build() {
                continue;
            }
            let provider = self.registry.get(&resource.provider)?;
            let wait_on: Vec<TaskId> = resource
                .dependencies()
                .into_iter()
                .filter_map(|dep| chains.get(dep).map(|chain| chain.final_task))
                .collect();
            let chain =
                provider.add_resource_tasks(resource, key, &mut dag, deployment, context, &wait_on)?;
            if dag.get(chain.root)?.inputs.is_empty() {
                dag.connect(start, chain.root)?;
            }
            debug!(resource_key = %key, provider = %resource.provider, root = %chain.root, "Added resource tasks");
            chains.insert(key.as_str(), chain);
        }

        // Host relations first so guests are wired onto their hosts
        for host_pass in [true, false] {
            for key in &order {
                let resource = &deployment.resources[key.as_str()];
                for (relation_key, relation) in &resource.relations {
                    if relation.is_host() != host_pass {
                        continue;
                    }
                    let target_new = deployment
                        .resources
                        .get(&relation.target)
                        .is_some_and(|t| t.status.needs_build());
                    if !host_pass && !resource.status.needs_build() && !target_new {
                        continue;
                    }
                    let provider = self.registry.get(&resource.provider)?;
                    let chain = provider.add_connection_tasks(
                        resource,
                        key,
                        relation,
                        relation_key,
                        &mut dag,
                        deployment,
                        context,
                    )?;
                    if let Some(chain) = chain {
                        if dag.get(chain.root)?.inputs.is_empty() {
                            dag.connect(start, chain.root)?;
                        }
                    }
                }
            }
        }

        self.finish(&mut dag)?;
        info!(tasks = dag.len(), resources = chains.len(), "Built deploy workflow spec");
        Ok(dag)
    }

    #[instrument(skip_all, fields(deployment_id = %deployment.id))]
    pub fn build_delete_spec(&self, deployment: &Deployment, context: &RequestContext) -> Result<TaskDag> {
        let order = build_order(&deployment.resources)?;
        let mut dag = TaskDag::new();
        let start = dag.start();

        let in_progress = deployment
            .operation
            .as_ref()
            .filter(|op| op.status == WorkflowStatus::InProgress);
        let anchor = match in_progress {
            Some(operation) => {
                let pause = dag.add_call(
                    "Pause Workflow",
                    TaskCall::new(WORKFLOW_PROVIDER, PAUSE_WORKFLOW_OPERATION)
                        .with_params(json!({ "workflow_id": operation.workflow_id })),
                    TaskProperties::new()
                        .tagged(&[TaskTag::Root, TaskTag::Pause])
                        .with_provider(WORKFLOW_PROVIDER)
                        .with_duration(1),
                );
                dag.connect(start, pause)?;
                pause
            }
            None => start,
        };

        let mut relation_finals: HashMap<&str, Vec<TaskId>> = HashMap::new();
        for key in &order {
            let resource = &deployment.resources[key.as_str()];
            if resource.status == ResourceStatus::Deleted {
                continue;
            }
            let provider = self.registry.get(&resource.provider)?;
            for (relation_key, relation) in &resource.relations {
                let chain = provider.delete_connection_tasks(
                    &mut dag,
                    context,
                    &deployment.id,
                    resource,
                    key,
                    relation,
                    relation_key,
                )?;
                if let Some(chain) = chain {
                    if dag.get(chain.root)?.inputs.is_empty() {
                        dag.connect(anchor, chain.root)?;
                    }
                    relation_finals
                        .entry(key.as_str())
                        .or_default()
                        .push(chain.final_task);
                    relation_finals
                        .entry(relation.target.as_str())
                        .or_default()
                        .push(chain.final_task);
                }
            }
        }

        for key in order.iter().rev() {
            let resource = &deployment.resources[key.as_str()];
            if resource.status == ResourceStatus::Deleted {
                continue;
            }
            let provider = self.registry.get(&resource.provider)?;
            let Some(chain) =
                provider.delete_resource_tasks(&mut dag, context, &deployment.id, resource, key)?
            else {
                continue;
            };
            let waits = relation_finals.get(key.as_str()).cloned().unwrap_or_default();
            if waits.is_empty() {
                if dag.get(chain.root)?.inputs.is_empty() {
                    dag.connect(anchor, chain.root)?;
                }
            } else {
                dag.wait_for(chain.root, &waits)?;
            }
        }

        self.finish(&mut dag)?;
        info!(tasks = dag.len(), paused_first = in_progress.is_some(), "Built delete workflow spec");
        Ok(dag)
    }

    fn finish(&self, dag: &mut TaskDag) -> Result<()> {
        let start = dag.start();
        if dag.reachable_from(start).is_empty() {
            let noop = dag.add_task("No-op", TaskKind::NoOp, TaskProperties::new().tagged(&[TaskTag::Final]));
            dag.connect(start, noop)?;
        }
        for task in dag.tasks_mut() {
            if !matches!(task.kind, TaskKind::Call(_)) {
                continue;
            }
            if task.properties.auto_retry_count.is_none() {
                task.properties.auto_retry_count = Some(self.config.default_auto_retry_count);
            }
            if task.properties.estimated_duration == 0 {
                task.properties.estimated_duration = self.config.default_estimated_duration_secs;
            }
        }
        dag.validate()
    }
}

/// Resource keys with every dependency ahead of its dependents.
///
/// Depth-first over relation targets and hosts; a key met again while still on
/// the active path is a cycle.
pub fn build_order(resources: &ResourceGraph) -> Result<Vec<String>> {
    let mut order = Vec::with_capacity(resources.len());
    let mut done: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = Vec::new();
    for key in resources.keys() {
        visit(key, resources, &mut stack, &mut done, &mut order)?;
    }
    Ok(order)
}

fn visit<'a>(
    key: &'a str,
    resources: &'a ResourceGraph,
    stack: &mut Vec<&'a str>,
    done: &mut HashSet<&'a str>,
    order: &mut Vec<String>,
) -> Result<()> {
    if done.contains(key) {
        return Ok(());
    }
    if let Some(position) = stack.iter().position(|k| *k == key) {
        let mut cycle: Vec<String> = stack[position..].iter().map(|k| k.to_string()).collect();
        cycle.push(key.to_string());
        return Err(DeployerError::CircularDependency { cycle });
    }
    let Some(resource) = resources.get(key) else {
        return Ok(());
    };
    stack.push(key);
    for dependency in resource.dependencies() {
        visit(dependency, resources, stack, done, order)?;
    }
    stack.pop();
    done.insert(key);
    order.push(key.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Blueprint, Environment, Operation, Relation, RelationKind, Resource, ResourceTemplate,
        WorkflowType,
    };
    use crate::providers::{Catalog, Provider, TemplateRequest};
    use crate::workflow::TaskOutcome;
    use async_trait::async_trait;
    use chrono::Utc;

    /// One create task per resource, one detach task per relation
    struct SimpleProvider;

    #[async_trait]
    impl Provider for SimpleProvider {
        fn name(&self) -> &str {
            "simple"
        }

        async fn generate_template(&self, request: &TemplateRequest<'_>) -> Result<Vec<ResourceTemplate>> {
            Ok(vec![ResourceTemplate::new(request.resource_type, request.service, "simple")])
        }

        fn add_resource_tasks(
            &self,
            _resource: &Resource,
            key: &str,
            dag: &mut TaskDag,
            _deployment: &Deployment,
            _context: &RequestContext,
            wait_on: &[TaskId],
        ) -> Result<TaskChain> {
            let create = dag.add_call(
                format!("Create {key}"),
                TaskCall::new("simple", "create").for_resource(key),
                TaskProperties::new()
                    .tagged(&[TaskTag::Root, TaskTag::Final])
                    .for_resource(key),
            );
            dag.wait_for(create, wait_on)?;
            Ok(TaskChain::single(create))
        }

        fn delete_resource_tasks(
            &self,
            dag: &mut TaskDag,
            _context: &RequestContext,
            _deployment_id: &str,
            _resource: &Resource,
            key: &str,
        ) -> Result<Option<TaskChain>> {
            let delete = dag.add_call(
                format!("Delete {key}"),
                TaskCall::new("simple", "delete").for_resource(key),
                TaskProperties::new()
                    .tagged(&[TaskTag::Root, TaskTag::Delete])
                    .for_resource(key),
            );
            Ok(Some(TaskChain::single(delete)))
        }

        #[allow(clippy::too_many_arguments)]
        fn delete_connection_tasks(
            &self,
            dag: &mut TaskDag,
            _context: &RequestContext,
            _deployment_id: &str,
            _resource: &Resource,
            key: &str,
            relation: &Relation,
            _relation_key: &str,
        ) -> Result<Option<TaskChain>> {
            let detach = dag.add_call(
                format!("Detach {key} from {}", relation.target),
                TaskCall::new("simple", "detach").for_resource(key),
                TaskProperties::new().tagged(&[TaskTag::Root]).for_resource(key),
            );
            Ok(Some(TaskChain::single(detach)))
        }

        async fn get_catalog(&self, _context: &RequestContext, _filter: Option<&str>) -> Result<Catalog> {
            Ok(Catalog::new())
        }

        async fn execute(&self, _call: &TaskCall, _context: &RequestContext) -> TaskOutcome {
            TaskOutcome::completed(json!({}))
        }
    }

    fn builder() -> WorkflowSpecBuilder {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(SimpleProvider));
        WorkflowSpecBuilder::new(Arc::new(registry), WorkflowConfig::default())
    }

    fn resource(key: &str) -> Resource {
        ResourceTemplate::new("compute", "svc", "simple").into_resource(key)
    }

    fn relate(resources: &mut ResourceGraph, source: &str, target: &str) {
        let relation = Relation {
            name: "attach".into(),
            kind: RelationKind::Attach,
            interface: None,
            source: source.into(),
            target: target.into(),
        };
        resources
            .get_mut(source)
            .unwrap()
            .relations
            .insert(format!("simple-attach-{target}"), relation);
    }

    fn deployment(keys: &[&str]) -> Deployment {
        let mut d = Deployment::new("dep", "t", Blueprint::new("bp", "bp"), Environment::new("e"));
        for key in keys {
            d.resources.insert(key.to_string(), resource(key));
        }
        d
    }

    fn operation(status: WorkflowStatus) -> Operation {
        Operation {
            workflow_id: "wf-1".into(),
            op_type: WorkflowType::Build,
            status,
            tasks: 2,
            complete: 1,
            errors: 0,
            progress: 50,
            estimated_duration: 20,
            error_details: Vec::new(),
            last_change: Utc::now(),
        }
    }

    #[test]
    fn test_build_order_puts_dependencies_first() {
        let mut d = deployment(&["0", "1", "2"]);
        relate(&mut d.resources, "0", "2");
        relate(&mut d.resources, "2", "1");
        assert_eq!(build_order(&d.resources).unwrap(), vec!["1", "2", "0"]);
    }

    #[test]
    fn test_build_order_rejects_cycles() {
        let mut d = deployment(&["0", "1"]);
        relate(&mut d.resources, "0", "1");
        relate(&mut d.resources, "1", "0");
        let err = build_order(&d.resources).unwrap_err();
        match err {
            DeployerError::CircularDependency { cycle } => {
                assert_eq!(cycle, vec!["0", "1", "0"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_deploy_spec_chains_dependencies() {
        let mut d = deployment(&["0", "1"]);
        relate(&mut d.resources, "0", "1");
        let dag = builder().build_deploy_spec(&d, &RequestContext::new("t")).unwrap();

        let create_0 = dag.find_by_name("Create 0").unwrap();
        let create_1 = dag.find_by_name("Create 1").unwrap();
        assert_eq!(dag.get(create_1).unwrap().inputs, vec![dag.start()]);
        assert_eq!(dag.get(create_0).unwrap().inputs, vec![create_1]);
        assert_eq!(
            dag.get(create_0).unwrap().properties.auto_retry_count,
            Some(WorkflowConfig::default().default_auto_retry_count)
        );
    }

    #[test]
    fn test_empty_deployment_gets_noop() {
        let d = deployment(&[]);
        let dag = builder().build_deploy_spec(&d, &RequestContext::new("t")).unwrap();
        assert_eq!(dag.len(), 3);
        let noop = dag.find_by_name("No-op").unwrap();
        assert!(matches!(dag.get(noop).unwrap().kind, TaskKind::NoOp));
        assert_eq!(dag.get(noop).unwrap().inputs, vec![dag.start()]);
    }

    #[test]
    fn test_built_resources_are_skipped() {
        let mut d = deployment(&["0"]);
        d.resources.get_mut("0").unwrap().status = ResourceStatus::Active;
        let dag = builder().build_deploy_spec(&d, &RequestContext::new("t")).unwrap();
        assert!(dag.find_by_name("Create 0").is_none());
        assert!(dag.find_by_name("No-op").is_some());
    }

    #[test]
    fn test_delete_spec_under_start_when_complete() {
        let mut d = deployment(&["0", "1"]);
        d.operation = Some(operation(WorkflowStatus::Complete));
        let dag = builder().build_delete_spec(&d, &RequestContext::new("t")).unwrap();
        for key in ["0", "1"] {
            let delete = dag.find_by_name(&format!("Delete {key}")).unwrap();
            assert_eq!(dag.get(delete).unwrap().inputs, vec![dag.start()]);
        }
        assert!(dag.find_tasks(None, Some(TaskTag::Pause)).is_empty());
    }

    #[test]
    fn test_delete_spec_pauses_in_progress_workflow_first() {
        let mut d = deployment(&["0"]);
        d.operation = Some(operation(WorkflowStatus::InProgress));
        let dag = builder().build_delete_spec(&d, &RequestContext::new("t")).unwrap();

        let pause = dag.find_by_name("Pause Workflow").unwrap();
        let pause_task = dag.get(pause).unwrap();
        assert_eq!(pause_task.inputs, vec![dag.start()]);
        assert_eq!(
            pause_task.kind.call().unwrap().params["workflow_id"],
            json!("wf-1")
        );
        let delete = dag.find_by_name("Delete 0").unwrap();
        assert_eq!(dag.get(delete).unwrap().inputs, vec![pause]);
    }

    #[test]
    fn test_delete_waits_on_relation_teardown() {
        let mut d = deployment(&["0", "1"]);
        relate(&mut d.resources, "0", "1");
        let dag = builder().build_delete_spec(&d, &RequestContext::new("t")).unwrap();

        let detach = dag.find_by_name("Detach 0 from 1").unwrap();
        assert_eq!(dag.get(detach).unwrap().inputs, vec![dag.start()]);
        for key in ["0", "1"] {
            let delete = dag.find_by_name(&format!("Delete {key}")).unwrap();
            assert_eq!(dag.get(delete).unwrap().inputs, vec![detach]);
        }
    }
}
