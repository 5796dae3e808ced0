use super::blueprint::{Constraint, Interface};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provider bindings available to a deployment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    /// Provider key to binding
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderBinding>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderBinding {
    #[serde(default)]
    pub vendor: Option<String>,
    /// Resource types this binding serves; empty means "ask the catalog"
    #[serde(default)]
    pub provides: Vec<Interface>,
    /// Provider-supplied setting defaults
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            providers: BTreeMap::new(),
        }
    }

    pub fn with_provider(mut self, key: impl Into<String>, binding: ProviderBinding) -> Self {
        self.providers.insert(key.into(), binding);
        self
    }

    /// First binding (in key order) that declares it provides `resource_type`
    pub fn binding_for(&self, resource_type: &str, interface: Option<&str>) -> Option<&str> {
        self.providers
            .iter()
            .find(|(_, binding)| {
                binding
                    .provides
                    .iter()
                    .any(|i| i.satisfies(resource_type, interface))
            })
            .map(|(key, _)| key.as_str())
    }
}

impl ProviderBinding {
    pub fn providing(mut self, interface: Interface) -> Self {
        self.provides.push(interface);
        self
    }

    pub fn with_default(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}
