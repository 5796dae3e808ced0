//! # Settings Resolver
//!
//! Answers "what value should setting X have for this resource?" from the
//! deployment's inputs, blueprint and environment.
//!
//! ## Precedence
//!
//! First match wins:
//!
//! 1. user input under the qualified path `service:type/name`
//! 2. user input under the bare `name`
//! 3. user input for a blueprint option that constrains the setting
//! 4. blueprint service constraints (typed, then requirement-level, then untyped)
//! 5. default of a blueprint option that constrains the setting
//! 6. constraint supplied by the environment's provider binding
//! 7. the caller's default
//!
//! Otherwise the setting is absent. Resolution is a pure read of the
//! deployment.

use crate::models::{Deployment, ServiceDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingSource {
    QualifiedInput,
    BareInput,
    OptionInput,
    ServiceConstraint,
    OptionDefault,
    ProviderDefault,
    CallerDefault,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSetting {
    pub value: Value,
    pub source: SettingSource,
}

impl ResolvedSetting {
    fn new(value: &Value, source: SettingSource) -> Self {
        Self {
            value: value.clone(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SettingsResolver<'a> {
    deployment: &'a Deployment,
}

impl<'a> SettingsResolver<'a> {
    pub fn new(deployment: &'a Deployment) -> Self {
        Self { deployment }
    }

    pub fn get_setting(
        &self,
        name: &str,
        resource_type: Option<&str>,
        service: Option<&str>,
        provider_key: Option<&str>,
        default: Option<Value>,
    ) -> Option<Value> {
        self.resolve(name, resource_type, service, provider_key, default)
            .map(|resolved| resolved.value)
    }

    /// Like [`get_setting`](Self::get_setting) but reports the winning source
    pub fn resolve(
        &self,
        name: &str,
        resource_type: Option<&str>,
        service: Option<&str>,
        provider_key: Option<&str>,
        default: Option<Value>,
    ) -> Option<ResolvedSetting> {
        let inputs = &self.deployment.inputs;
        let blueprint = &self.deployment.blueprint;

        if let (Some(service), Some(resource_type)) = (service, resource_type) {
            if let Some(value) = inputs.get(&format!("{service}:{resource_type}/{name}")) {
                return Some(ResolvedSetting::new(value, SettingSource::QualifiedInput));
            }
        }

        if let Some(value) = inputs.get(name) {
            return Some(ResolvedSetting::new(value, SettingSource::BareInput));
        }

        let mut constraining_options = blueprint.options.iter().filter(|(_, option)| {
            option
                .constrains
                .iter()
                .any(|target| target.matches(name, resource_type, service))
        });

        if let Some(value) = constraining_options
            .clone()
            .find_map(|(option_name, _)| inputs.get(option_name))
        {
            return Some(ResolvedSetting::new(value, SettingSource::OptionInput));
        }

        if let Some(definition) = service.and_then(|s| blueprint.services.get(s)) {
            if let Some(value) = service_constraint(definition, name, resource_type) {
                return Some(ResolvedSetting::new(value, SettingSource::ServiceConstraint));
            }
        }

        if let Some(value) = constraining_options.find_map(|(_, option)| option.default.as_ref()) {
            return Some(ResolvedSetting::new(value, SettingSource::OptionDefault));
        }

        if let Some(binding) = provider_key.and_then(|key| self.deployment.environment.providers.get(key)) {
            let found = binding.constraints.iter().find(|c| {
                c.setting == name
                    && match (c.resource_type.as_deref(), resource_type) {
                        (Some(wanted), Some(actual)) => wanted == actual,
                        (Some(_), None) => false,
                        (None, _) => true,
                    }
            });
            if let Some(constraint) = found {
                return Some(ResolvedSetting::new(&constraint.value, SettingSource::ProviderDefault));
            }
        }

        default.map(|value| ResolvedSetting {
            value,
            source: SettingSource::CallerDefault,
        })
    }
}

fn service_constraint<'d>(
    definition: &'d ServiceDefinition,
    name: &str,
    resource_type: Option<&str>,
) -> Option<&'d Value> {
    if let Some(resource_type) = resource_type {
        let typed = definition
            .constraints
            .iter()
            .find(|c| c.setting == name && c.resource_type.as_deref() == Some(resource_type));
        if let Some(constraint) = typed {
            return Some(&constraint.value);
        }
        // Supporting resources pick up constraints declared on the requirement
        let from_requirement = definition
            .requires
            .iter()
            .filter(|r| r.resource_type == resource_type)
            .flat_map(|r| r.constraints.iter())
            .find(|c| c.setting == name);
        if let Some(constraint) = from_requirement {
            return Some(&constraint.value);
        }
    }

    let applies = resource_type.map_or(true, |rt| rt == definition.component.resource_type);
    if !applies {
        return None;
    }
    definition
        .constraints
        .iter()
        .find(|c| c.setting == name && c.resource_type.is_none())
        .map(|c| &c.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Blueprint, BlueprintOption, Constraint, Environment, OptionTarget, ProviderBinding,
        RelationKind, Requirement, ServiceDefinition,
    };
    use serde_json::json;

    fn deployment() -> Deployment {
        let blueprint = Blueprint::new("bp", "wordpress")
            .with_service(
                "web",
                ServiceDefinition::new("compute")
                    .with_constraint(Constraint::new("memory", json!("2GB")))
                    .with_constraint(Constraint::new("region", json!("ORD")).for_type("compute")),
            )
            .with_service(
                "db",
                ServiceDefinition::new("compute").requiring(
                    Requirement::new("volume", RelationKind::Attach)
                        .dedicated()
                        .with_constraint("size", json!(200)),
                ),
            )
            .with_option(
                "disk",
                BlueprintOption {
                    default: Some(json!(50)),
                    required: false,
                    constrains: vec![OptionTarget {
                        service: Some("db".into()),
                        resource_type: Some("volume".into()),
                        setting: "size".into(),
                    }],
                },
            )
            .with_option(
                "os",
                BlueprintOption {
                    default: Some(json!("Ubuntu 22.04")),
                    required: false,
                    constrains: vec![OptionTarget {
                        service: None,
                        resource_type: Some("compute".into()),
                        setting: "image".into(),
                    }],
                },
            );
        let environment = Environment::new("prod").with_provider(
            "nova",
            ProviderBinding::default()
                .with_default(Constraint::new("image", json!("CentOS")))
                .with_default(Constraint::new("flavor", json!("1GB")).for_type("compute")),
        );
        Deployment::new("d", "t", blueprint, environment)
    }

    fn get(d: &Deployment, name: &str, rt: &str, service: &str) -> Option<ResolvedSetting> {
        SettingsResolver::new(d).resolve(name, Some(rt), Some(service), Some("nova"), None)
    }

    #[test]
    fn test_qualified_input_beats_bare_input() {
        let d = deployment()
            .with_input("memory", json!("4GB"))
            .with_input("web:compute/memory", json!("8GB"));
        let resolved = get(&d, "memory", "compute", "web").unwrap();
        assert_eq!(resolved.value, json!("8GB"));
        assert_eq!(resolved.source, SettingSource::QualifiedInput);

        let resolved = get(&d, "memory", "compute", "db").unwrap();
        assert_eq!(resolved.value, json!("4GB"));
        assert_eq!(resolved.source, SettingSource::BareInput);
    }

    #[test]
    fn test_service_constraints() {
        let d = deployment();
        assert_eq!(get(&d, "memory", "compute", "web").unwrap().value, json!("2GB"));
        assert_eq!(get(&d, "region", "compute", "web").unwrap().value, json!("ORD"));
        // Untyped constraints do not leak onto other resource types
        assert_eq!(get(&d, "memory", "volume", "web"), None);
    }

    #[test]
    fn test_requirement_constraint_beats_option_default() {
        let d = deployment();
        let resolved = get(&d, "size", "volume", "db").unwrap();
        assert_eq!(resolved.value, json!(200));
        assert_eq!(resolved.source, SettingSource::ServiceConstraint);

        let d = deployment().with_input("disk", json!(500));
        let resolved = get(&d, "size", "volume", "db").unwrap();
        assert_eq!(resolved.value, json!(500));
        assert_eq!(resolved.source, SettingSource::OptionInput);
    }

    #[test]
    fn test_option_default_beats_provider_default() {
        let d = deployment();
        let resolved = get(&d, "image", "compute", "web").unwrap();
        assert_eq!(resolved.value, json!("Ubuntu 22.04"));
        assert_eq!(resolved.source, SettingSource::OptionDefault);
    }

    #[test]
    fn test_provider_default_then_caller_default() {
        let d = deployment();
        let resolved = get(&d, "flavor", "compute", "web").unwrap();
        assert_eq!(resolved.source, SettingSource::ProviderDefault);
        assert_eq!(get(&d, "flavor", "volume", "db"), None);

        let value = SettingsResolver::new(&d).get_setting(
            "count",
            Some("compute"),
            Some("web"),
            Some("nova"),
            Some(json!(1)),
        );
        assert_eq!(value, Some(json!(1)));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let d = deployment().with_input("memory", json!("4GB"));
        let resolver = SettingsResolver::new(&d);
        let first = resolver.get_setting("memory", Some("compute"), Some("web"), None, None);
        let second = resolver.get_setting("memory", Some("compute"), Some("web"), None, None);
        assert_eq!(first, second);
    }
}
