//! In-test provider doubles: "nova" builds servers, "cbs" builds volumes.
//!
//! Both share a [`Script`] that records every dispatched call and hands out
//! queued outcomes per operation, falling back to success with a status
//! postback.

use async_trait::async_trait;
use deployer_core::error::{ProviderError, Result};
use deployer_core::models::{
    Deployment, Interface, Message, Relation, RelationKind, RequestContext, Resource,
    ResourceTemplate,
};
use deployer_core::providers::{Catalog, Provider, TemplateRequest};
use deployer_core::workflow::{
    ResourcePostback, TaskCall, TaskChain, TaskDag, TaskId, TaskOutcome, TaskOutput,
    TaskProperties, TaskTag,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct Script {
    outcomes: Mutex<HashMap<String, VecDeque<TaskOutcome>>>,
    dispatched: Mutex<Vec<String>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `outcome` for the next call of `operation`
    pub fn push(&self, operation: &str, outcome: TaskOutcome) {
        self.outcomes
            .lock()
            .entry(operation.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Every dispatched call as `operation:resource_key`
    pub fn dispatched(&self) -> Vec<String> {
        self.dispatched.lock().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.dispatched
            .lock()
            .iter()
            .filter(|entry| entry.split(':').next() == Some(operation))
            .count()
    }

    fn next(&self, provider: &dyn Provider, call: &TaskCall) -> TaskOutcome {
        let key = call.resource_key.clone().unwrap_or_default();
        self.dispatched
            .lock()
            .push(format!("{}:{key}", call.operation));
        if let Some(outcome) = self
            .outcomes
            .lock()
            .get_mut(&call.operation)
            .and_then(VecDeque::pop_front)
        {
            return outcome;
        }

        let raw_status = match call.operation.as_str() {
            "create_server" | "create_volume" => Some("BUILD"),
            "wait_for_build" => Some("ACTIVE"),
            "delete_server" | "delete_volume" => Some("DELETING"),
            "wait_for_delete" => Some("DELETED"),
            _ => None,
        };
        let mut output = TaskOutput::new(json!({"operation": call.operation}));
        if let Some(raw) = raw_status {
            let mut postback = ResourcePostback::new(&key).with_status(provider.translate_status(raw));
            if raw == "BUILD" {
                postback = postback.with_instance("id", json!(format!("{}-{key}", provider.name())));
            }
            output = output.with_postback(postback);
        }
        TaskOutcome::Completed(output)
    }
}

fn chain(
    dag: &mut TaskDag,
    provider: &str,
    key: &str,
    first: (&str, &str),
    second: (&str, &str),
    first_tag: TaskTag,
    second_tag: TaskTag,
) -> Result<TaskChain> {
    let head = dag.add_call(
        first.0,
        TaskCall::new(provider, first.1).for_resource(key),
        TaskProperties::new()
            .tagged(&[TaskTag::Root, first_tag])
            .for_resource(key)
            .with_provider(provider)
            .with_duration(20),
    );
    let tail = dag.add_call(
        second.0,
        TaskCall::new(provider, second.1).for_resource(key),
        TaskProperties::new()
            .tagged(&[TaskTag::Final, second_tag])
            .for_resource(key)
            .with_provider(provider)
            .with_duration(40),
    );
    dag.connect(head, tail)?;
    Ok(TaskChain::new(head, tail))
}

fn final_task(dag: &TaskDag, key: &str) -> Option<TaskId> {
    dag.find_tasks(Some(key), Some(TaskTag::Final)).first().copied()
}

/// Compute provider
#[derive(Debug)]
pub struct ServerProvider {
    pub script: std::sync::Arc<Script>,
    /// Servers allowed by the account; `verify_limits` reports anything above
    pub server_limit: usize,
    pub catalog_calls: AtomicUsize,
    /// When set, `verify_access` fails instead of answering
    pub access_outage: AtomicBool,
}

impl ServerProvider {
    pub fn new(script: std::sync::Arc<Script>) -> Self {
        Self {
            script,
            server_limit: 10,
            catalog_calls: AtomicUsize::new(0),
            access_outage: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Provider for ServerProvider {
    fn name(&self) -> &str {
        "nova"
    }

    async fn generate_template(&self, request: &TemplateRequest<'_>) -> Result<Vec<ResourceTemplate>> {
        let mut template = ResourceTemplate::new(request.resource_type, request.service, request.provider_key)
            .with_setting("flavor", request.get_setting("flavor", Some(json!("2GB"))).unwrap_or_default())
            .with_setting("image", request.get_setting("image", Some(json!("Ubuntu 22.04"))).unwrap_or_default());
        if let Some(region) = request.get_setting("region", None) {
            template = template.with_setting("region", region);
        }
        template.provides.push(Interface::new("compute"));
        Ok(vec![template])
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
        let chain = chain(
            dag,
            "nova",
            key,
            ("Create Server", "create_server"),
            ("Wait for Server build", "wait_for_build"),
            TaskTag::Create,
            TaskTag::Build,
        )?;
        dag.wait_for(chain.root, wait_on)?;
        Ok(chain)
    }

    #[allow(clippy::too_many_arguments)]
    fn add_connection_tasks(
        &self,
        _resource: &Resource,
        key: &str,
        relation: &Relation,
        _relation_key: &str,
        dag: &mut TaskDag,
        _deployment: &Deployment,
        _context: &RequestContext,
    ) -> Result<Option<TaskChain>> {
        if relation.kind != RelationKind::Attach {
            return Ok(None);
        }
        let attach = dag.add_call(
            "Attach Server to Volume",
            TaskCall::new("nova", "attach_volume")
                .for_resource(key)
                .with_params(json!({"volume": relation.target})),
            TaskProperties::new()
                .tagged(&[TaskTag::Root])
                .for_resource(key)
                .with_provider("nova"),
        );
        let waits: Vec<TaskId> = [final_task(dag, key), final_task(dag, &relation.target)]
            .into_iter()
            .flatten()
            .collect();
        dag.wait_for(attach, &waits)?;
        Ok(Some(TaskChain::single(attach)))
    }

    fn delete_resource_tasks(
        &self,
        dag: &mut TaskDag,
        _context: &RequestContext,
        _deployment_id: &str,
        _resource: &Resource,
        key: &str,
    ) -> Result<Option<TaskChain>> {
        chain(
            dag,
            "nova",
            key,
            ("Delete Server", "delete_server"),
            ("Wait for Server delete", "wait_for_delete"),
            TaskTag::Delete,
            TaskTag::Delete,
        )
        .map(Some)
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
        if relation.kind != RelationKind::Attach {
            return Ok(None);
        }
        let detach = dag.add_call(
            "Detach Volume",
            TaskCall::new("nova", "detach_volume").for_resource(key),
            TaskProperties::new()
                .tagged(&[TaskTag::Root, TaskTag::Delete])
                .for_resource(key)
                .with_provider("nova"),
        );
        Ok(Some(TaskChain::single(detach)))
    }

    async fn verify_limits(&self, _context: &RequestContext, resources: &[Resource]) -> Result<Vec<Message>> {
        let servers = resources.iter().filter(|r| r.resource_type == "compute").count();
        if servers > self.server_limit {
            return Ok(vec![Message::error(
                "nova",
                "limits",
                format!("{servers} servers requested, limit is {}", self.server_limit),
            )]);
        }
        Ok(vec![Message::info("nova", "limits", "Within server quota")])
    }

    async fn verify_access(&self, _context: &RequestContext) -> Result<Message> {
        if self.access_outage.load(Ordering::SeqCst) {
            return Err(ProviderError::transient("identity endpoint timed out").into());
        }
        Ok(Message::info("nova", "access", "Compute access verified"))
    }

    async fn get_catalog(&self, _context: &RequestContext, type_filter: Option<&str>) -> Result<Catalog> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Catalog::new()
            .with_type("compute", json!({"flavors": ["1GB", "2GB", "4GB"]}))
            .filtered(type_filter))
    }

    async fn execute(&self, call: &TaskCall, _context: &RequestContext) -> TaskOutcome {
        self.script.next(self, call)
    }
}

/// Block-storage provider
#[derive(Debug)]
pub struct VolumeProvider {
    pub script: std::sync::Arc<Script>,
}

impl VolumeProvider {
    pub fn new(script: std::sync::Arc<Script>) -> Self {
        Self { script }
    }
}

#[async_trait]
impl Provider for VolumeProvider {
    fn name(&self) -> &str {
        "cbs"
    }

    async fn generate_template(&self, request: &TemplateRequest<'_>) -> Result<Vec<ResourceTemplate>> {
        let size = request.get_setting("size", Some(json!(100))).unwrap_or_default();
        let mut template =
            ResourceTemplate::new("volume", request.service, request.provider_key).with_setting("size", size);
        template.provides.push(Interface::new("volume"));
        Ok(vec![template])
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
        let chain = chain(
            dag,
            "cbs",
            key,
            ("Create Volume", "create_volume"),
            ("Wait for Volume build", "wait_for_build"),
            TaskTag::Create,
            TaskTag::Build,
        )?;
        dag.wait_for(chain.root, wait_on)?;
        Ok(chain)
    }

    fn delete_resource_tasks(
        &self,
        dag: &mut TaskDag,
        _context: &RequestContext,
        _deployment_id: &str,
        _resource: &Resource,
        key: &str,
    ) -> Result<Option<TaskChain>> {
        chain(
            dag,
            "cbs",
            key,
            ("Delete Volume", "delete_volume"),
            ("Wait for Volume delete", "wait_for_delete"),
            TaskTag::Delete,
            TaskTag::Delete,
        )
        .map(Some)
    }

    async fn get_catalog(&self, _context: &RequestContext, type_filter: Option<&str>) -> Result<Catalog> {
        Ok(Catalog::new()
            .with_type("volume", json!({"sizes": [100, 250, 500]}))
            .filtered(type_filter))
    }

    async fn execute(&self, call: &TaskCall, _context: &RequestContext) -> TaskOutcome {
        self.script.next(self, call)
    }
}
