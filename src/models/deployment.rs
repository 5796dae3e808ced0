use super::{
    blueprint::{Blueprint, RelationKind},
    environment::Environment,
    message::Message,
    operation::Operation,
    resource::ResourceGraph,
};
use crate::error::{DeployerError, Result};
use crate::state_machine::DeploymentStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Root aggregate owned by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub status: DeploymentStatus,
    pub blueprint: Blueprint,
    pub environment: Environment,
    /// User-supplied values keyed by path (`name` or `service:type/name`)
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub resources: ResourceGraph,
    #[serde(default)]
    pub plan: Option<PlanRecord>,
    /// Provider access/limit check results from planning
    #[serde(default)]
    pub check_results: Vec<Message>,
    #[serde(default)]
    pub operation: Option<Operation>,
    #[serde(default)]
    pub operations_history: Vec<Operation>,
    /// Compare-and-swap revision maintained by the store
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Serializable record of planning decisions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    pub services: BTreeMap<String, ServicePlan>,
    pub requirements: Vec<ResolvedRequirement>,
    /// Requirement-resolution passes used
    pub passes: u32,
    pub planned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePlan {
    pub provider: String,
    pub resource_type: String,
    pub resource_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRequirement {
    pub service: String,
    pub source: String,
    pub target: String,
    pub relation_key: String,
    pub relation: RelationKind,
    pub dedicated: bool,
}

impl Deployment {
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        blueprint: Blueprint,
        environment: Environment,
    ) -> Self {
        let now = Utc::now();
        let name = blueprint.name.clone();
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            name,
            status: DeploymentStatus::New,
            blueprint,
            environment,
            inputs: BTreeMap::new(),
            resources: ResourceGraph::new(),
            plan: None,
            check_results: Vec::new(),
            operation: None,
            operations_history: Vec::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_input(mut self, path: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(path.into(), value);
        self
    }

    /// Replace the current operation, archiving the previous one if it belongs
    /// to a different workflow
    pub fn set_operation(&mut self, operation: Operation) {
        match self.operation.take() {
            Some(previous) if previous.workflow_id != operation.workflow_id => {
                self.operations_history.push(previous);
            }
            _ => {}
        }
        self.operation = Some(operation);
        self.updated_at = Utc::now();
    }

    /// Refresh the summary of `operation` without changing which workflow is
    /// current. A summary from an older workflow only updates its archived
    /// entry. Returns whether `operation` is the current one.
    pub fn record_operation(&mut self, operation: Operation) -> bool {
        self.updated_at = Utc::now();
        match &self.operation {
            Some(current) if current.workflow_id != operation.workflow_id => {
                match self
                    .operations_history
                    .iter_mut()
                    .find(|op| op.workflow_id == operation.workflow_id)
                {
                    Some(archived) => *archived = operation,
                    None => self.operations_history.push(operation),
                }
                false
            }
            _ => {
                self.operation = Some(operation);
                true
            }
        }
    }

    /// Check relation targets exist and host back-references agree
    pub fn validate_resource_graph(&self) -> Result<()> {
        validate_graph(&self.resources)
    }
}

pub(crate) fn validate_graph(resources: &ResourceGraph) -> Result<()> {
    for (key, resource) in resources {
        if resource.index != *key {
            return Err(DeployerError::validation(format!(
                "Resource stored under '{key}' has index '{}'",
                resource.index
            )));
        }
        for (relation_key, relation) in &resource.relations {
            if !resources.contains_key(&relation.target) {
                return Err(DeployerError::validation(format!(
                    "Relation '{relation_key}' on resource '{key}' targets unknown resource '{}'",
                    relation.target
                )));
            }
        }
        if let Some(host) = &resource.hosted_on {
            let consistent = resources
                .get(host)
                .map(|h| h.hosts.contains(key))
                .unwrap_or(false);
            if !consistent {
                return Err(DeployerError::validation(format!(
                    "Resource '{key}' is hosted on '{host}' but '{host}' does not list it in hosts"
                )));
            }
        }
        for guest in &resource.hosts {
            let consistent = resources
                .get(guest)
                .map(|g| g.hosted_on.as_deref() == Some(key.as_str()))
                .unwrap_or(false);
            if !consistent {
                return Err(DeployerError::validation(format!(
                    "Resource '{key}' hosts '{guest}' but '{guest}' is not hosted on it"
                )));
            }
        }
    }
    Ok(())
}
