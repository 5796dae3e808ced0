//! Blueprint model: the declarative description of an application's services.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceDefinition>,
    #[serde(default)]
    pub options: BTreeMap<String, BlueprintOption>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub component: Component,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub requires: Vec<Requirement>,
    #[serde(default)]
    pub provides: Vec<Interface>,
}

/// What a service is built from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub resource_type: String,
    #[serde(default)]
    pub interface: Option<String>,
    /// Explicit provider key; otherwise chosen from the environment
    #[serde(default)]
    pub provider: Option<String>,
}

/// A fixed setting value, optionally scoped to one resource type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub setting: String,
    #[serde(default)]
    pub resource_type: Option<String>,
    pub value: Value,
}

impl Constraint {
    pub fn new(setting: impl Into<String>, value: Value) -> Self {
        Self {
            setting: setting.into(),
            resource_type: None,
            value,
        }
    }

    pub fn for_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Guest runs on the target
    Host,
    /// Target is attached to the source (volumes)
    Attach,
    Connect,
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Attach => write!(f, "attach"),
            Self::Connect => write!(f, "connect"),
        }
    }
}

/// A "requires" entry on a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    #[serde(default)]
    pub name: Option<String>,
    pub resource_type: String,
    #[serde(default)]
    pub interface: Option<String>,
    pub relation: RelationKind,
    /// Inject a supporting resource instead of binding to another service
    #[serde(default)]
    pub dedicated: bool,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl Requirement {
    pub fn new(resource_type: impl Into<String>, relation: RelationKind) -> Self {
        Self {
            name: None,
            resource_type: resource_type.into(),
            interface: None,
            relation,
            dedicated: false,
            constraints: Vec::new(),
        }
    }

    pub fn dedicated(mut self) -> Self {
        self.dedicated = true;
        self
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn with_constraint(mut self, setting: impl Into<String>, value: Value) -> Self {
        self.constraints.push(Constraint::new(setting, value));
        self
    }

    /// Relation name used in relation keys
    pub fn relation_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.relation.to_string())
    }
}

/// A resource type/interface pair a service or resource offers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub resource_type: String,
    #[serde(default)]
    pub interface: Option<String>,
}

impl Interface {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            interface: None,
        }
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// An unspecified interface on either side matches any interface
    pub fn satisfies(&self, resource_type: &str, interface: Option<&str>) -> bool {
        if self.resource_type != resource_type {
            return false;
        }
        match (self.interface.as_deref(), interface) {
            (Some(offered), Some(wanted)) => offered == wanted,
            _ => true,
        }
    }
}

/// User-facing blueprint option
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlueprintOption {
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
    /// Settings this option feeds
    #[serde(default)]
    pub constrains: Vec<OptionTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionTarget {
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
    pub setting: String,
}

impl OptionTarget {
    pub fn matches(&self, setting: &str, resource_type: Option<&str>, service: Option<&str>) -> bool {
        if self.setting != setting {
            return false;
        }
        let service_ok = match (self.service.as_deref(), service) {
            (Some(wanted), Some(actual)) => wanted == actual,
            (Some(_), None) => false,
            (None, _) => true,
        };
        let type_ok = match (self.resource_type.as_deref(), resource_type) {
            (Some(wanted), Some(actual)) => wanted == actual,
            (Some(_), None) => false,
            (None, _) => true,
        };
        service_ok && type_ok
    }
}

impl Blueprint {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_service(mut self, name: impl Into<String>, service: ServiceDefinition) -> Self {
        self.services.insert(name.into(), service);
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, option: BlueprintOption) -> Self {
        self.options.insert(name.into(), option);
        self
    }
}

impl ServiceDefinition {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            component: Component {
                resource_type: resource_type.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.component.provider = Some(provider.into());
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn requiring(mut self, requirement: Requirement) -> Self {
        self.requires.push(requirement);
        self
    }

    pub fn providing(mut self, interface: Interface) -> Self {
        self.provides.push(interface);
        self
    }
}
