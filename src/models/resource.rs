use super::blueprint::{Interface, RelationKind, Requirement};
use crate::state_machine::ResourceStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Resources of a deployment keyed by resource key
pub type ResourceGraph = BTreeMap<String, Resource>;

/// One physical or logical unit to be created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Key unique within the deployment
    pub index: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub provider: String,
    pub service: String,
    /// Settings resolved at plan time
    #[serde(default)]
    pub desired_state: BTreeMap<String, Value>,
    /// Live provider data populated during execution
    #[serde(default)]
    pub instance: BTreeMap<String, Value>,
    #[serde(default)]
    pub relations: BTreeMap<String, Relation>,
    #[serde(default)]
    pub provides: Vec<Interface>,
    /// Keys of resources hosted on this one
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub hosted_on: Option<String>,
    #[serde(default)]
    pub status: ResourceStatus,
    #[serde(default)]
    pub status_detail: Option<String>,
}

/// Directed edge from `source` to `target`, stored on the source resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    #[serde(default)]
    pub interface: Option<String>,
    pub source: String,
    pub target: String,
}

impl Relation {
    pub fn is_host(&self) -> bool {
        self.kind == RelationKind::Host
    }
}

/// What a provider proposes for one resource before a key is assigned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    pub resource_type: String,
    pub service: String,
    pub provider: String,
    #[serde(default)]
    pub desired_state: BTreeMap<String, Value>,
    /// Additional requirements this resource brings (resolved in a later pass)
    #[serde(default)]
    pub requires: Vec<Requirement>,
    #[serde(default)]
    pub provides: Vec<Interface>,
}

impl ResourceTemplate {
    pub fn new(
        resource_type: impl Into<String>,
        service: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            service: service.into(),
            provider: provider.into(),
            desired_state: BTreeMap::new(),
            requires: Vec::new(),
            provides: Vec::new(),
        }
    }

    pub fn with_setting(mut self, name: impl Into<String>, value: Value) -> Self {
        self.desired_state.insert(name.into(), value);
        self
    }

    pub fn into_resource(self, key: impl Into<String>) -> Resource {
        Resource {
            index: key.into(),
            resource_type: self.resource_type,
            provider: self.provider,
            service: self.service,
            desired_state: self.desired_state,
            instance: BTreeMap::new(),
            relations: BTreeMap::new(),
            provides: self.provides,
            hosts: Vec::new(),
            hosted_on: None,
            status: ResourceStatus::New,
            status_detail: None,
        }
    }
}

impl Resource {
    /// Keys this resource depends on: relation targets, then its host
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = Vec::new();
        for relation in self.relations.values() {
            if !deps.contains(&relation.target.as_str()) {
                deps.push(relation.target.as_str());
            }
        }
        if let Some(host) = self.hosted_on.as_deref() {
            if !deps.contains(&host) {
                deps.push(host);
            }
        }
        deps
    }

    pub fn setting(&self, name: &str) -> Option<&Value> {
        self.desired_state.get(name)
    }
}
