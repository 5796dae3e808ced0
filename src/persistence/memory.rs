use super::DeploymentStore;
use crate::error::{DeployerError, Result};
use crate::models::Deployment;
use crate::workflow::Workflow;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone)]
struct Stored<T> {
    tenant_id: String,
    body: T,
}

/// Process-local store with per-key compare-and-swap
#[derive(Debug, Default)]
pub struct InMemoryStore {
    deployments: DashMap<String, Stored<Deployment>>,
    workflows: DashMap<String, Stored<Workflow>>,
    secrets: DashMap<String, Value>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deployment_count(&self) -> usize {
        self.deployments.len()
    }

    pub fn workflow_count(&self) -> usize {
        self.workflows.len()
    }

    /// Whether secrets were recorded for `id`
    pub fn has_secrets(&self, id: &str) -> bool {
        self.secrets.contains_key(id)
    }

    fn keep_secrets(&self, id: &str, secrets: Option<Value>) {
        if let Some(secrets) = secrets {
            self.secrets.insert(id.to_string(), secrets);
        }
    }
}

/// Bodies saved with compare-and-swap
trait Revisioned: Clone {
    const ENTITY: &'static str;
    fn id(&self) -> &str;
    fn revision(&self) -> u64;
    fn set_revision(&mut self, revision: u64);
    fn touch(&mut self);
}

impl Revisioned for Deployment {
    const ENTITY: &'static str = "deployment";
    fn id(&self) -> &str {
        &self.id
    }
    fn revision(&self) -> u64 {
        self.revision
    }
    fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }
    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Revisioned for Workflow {
    const ENTITY: &'static str = "workflow";
    fn id(&self) -> &str {
        &self.id
    }
    fn revision(&self) -> u64 {
        self.revision
    }
    fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }
    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn compare_and_swap<T: Revisioned>(
    map: &DashMap<String, Stored<T>>,
    id: &str,
    body: &T,
    tenant_id: &str,
) -> Result<T> {
    if body.id() != id {
        return Err(DeployerError::validation(format!(
            "{} body id '{}' does not match '{id}'",
            T::ENTITY,
            body.id()
        )));
    }
    let mut saved = body.clone();
    match map.entry(id.to_string()) {
        Entry::Occupied(mut occupied) => {
            let stored = occupied.get_mut();
            // Another tenant's record is invisible, not conflicting
            if stored.tenant_id != tenant_id {
                return Err(DeployerError::not_found(T::ENTITY, id));
            }
            let current = stored.body.revision();
            if current != body.revision() {
                return Err(DeployerError::ConcurrentModification {
                    entity: T::ENTITY.to_string(),
                    id: id.to_string(),
                    expected: body.revision(),
                    actual: current,
                });
            }
            saved.set_revision(current + 1);
            saved.touch();
            stored.body = saved.clone();
        }
        Entry::Vacant(vacant) => {
            saved.set_revision(body.revision() + 1);
            vacant.insert(Stored {
                tenant_id: tenant_id.to_string(),
                body: saved.clone(),
            });
        }
    }
    Ok(saved)
}

#[async_trait]
impl DeploymentStore for InMemoryStore {
    async fn save_deployment(
        &self,
        id: &str,
        body: &Deployment,
        secrets: Option<Value>,
        tenant_id: &str,
    ) -> Result<Deployment> {
        let saved = compare_and_swap(&self.deployments, id, body, tenant_id)?;
        self.keep_secrets(id, secrets);
        debug!(deployment_id = %id, revision = saved.revision, status = %saved.status, "Saved deployment");
        Ok(saved)
    }

    async fn get_deployment(&self, id: &str) -> Result<Deployment> {
        self.deployments
            .get(id)
            .map(|stored| stored.body.clone())
            .ok_or_else(|| DeployerError::not_found("deployment", id))
    }

    async fn save_workflow(
        &self,
        id: &str,
        body: &Workflow,
        secrets: Option<Value>,
        tenant_id: &str,
    ) -> Result<Workflow> {
        let saved = compare_and_swap(&self.workflows, id, body, tenant_id)?;
        self.keep_secrets(id, secrets);
        debug!(workflow_id = %id, revision = saved.revision, status = %saved.status(), "Saved workflow");
        Ok(saved)
    }

    async fn get_workflow(&self, id: &str) -> Result<Workflow> {
        self.workflows
            .get(id)
            .map(|stored| stored.body.clone())
            .ok_or_else(|| DeployerError::not_found("workflow", id))
    }
}
