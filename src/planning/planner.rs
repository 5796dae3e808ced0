//! # Planner
//!
//! Turns a NEW deployment's blueprint, environment and inputs into a resource
//! graph.
//!
//! ## Flow
//!
//! ```text
//! services ──▶ provider selection ──▶ generate_template × count
//!                                          │
//!            requirement resolution ◀──────┘   (bounded passes)
//!                     │
//!                     ▼
//!      cycle check ──▶ graph validation ──▶ access/limit verification
//!                     │
//!                     ▼
//!          commit resources + plan record, NEW → PLANNED
//! ```
//!
//! Planning is all-or-nothing: every step works on a candidate copy and the
//! deployment is only replaced once the PLANNED transition has succeeded.

use super::dependency_check::check_circular_dependencies;
use super::requirements::PendingRequirement;
use super::settings::SettingsResolver;
use super::verification::{verify_providers, VerificationRequest};
use crate::config::PlannerConfig;
use crate::constants::events;
use crate::error::{DeployerError, Result};
use crate::events::EventPublisher;
use crate::logging::log_deployment_operation;
use crate::models::deployment::validate_graph;
use crate::models::{Deployment, PlanRecord, RequestContext, ResourceGraph, ServicePlan};
use crate::providers::{CatalogService, ProviderRegistry, TemplateRequest};
use crate::state_machine::{DeploymentEvent, DeploymentStateMachine, DeploymentStatus};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Per-call planning switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOptions {
    pub check_access: bool,
    pub check_limits: bool,
}

impl From<&PlannerConfig> for PlanOptions {
    fn from(config: &PlannerConfig) -> Self {
        Self {
            check_access: config.check_access,
            check_limits: config.check_limits,
        }
    }
}

#[derive(Debug)]
pub struct Planner {
    pub(super) registry: Arc<ProviderRegistry>,
    pub(super) catalog: Arc<CatalogService>,
    pub(super) config: PlannerConfig,
    events: EventPublisher,
}

impl Planner {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        catalog: Arc<CatalogService>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            registry,
            catalog,
            config,
            events: EventPublisher::default(),
        }
    }

    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = events;
        self
    }

    pub async fn plan(&self, deployment: &mut Deployment, context: &RequestContext) -> Result<ResourceGraph> {
        let options = PlanOptions::from(&self.config);
        self.plan_with_options(deployment, context, options).await
    }

    #[instrument(skip_all, fields(deployment_id = %deployment.id, tenant_id = %deployment.tenant_id))]
    pub async fn plan_with_options(
        &self,
        deployment: &mut Deployment,
        context: &RequestContext,
        options: PlanOptions,
    ) -> Result<ResourceGraph> {
        if deployment.status != DeploymentStatus::New {
            return Err(DeployerError::StateError(format!(
                "Deployment {} is {}; only NEW deployments can be planned",
                deployment.id, deployment.status
            )));
        }
        check_required_options(deployment)?;

        let source: &Deployment = deployment;
        let mut resources = ResourceGraph::new();
        let mut next_key = 0usize;
        let mut services: BTreeMap<String, ServicePlan> = BTreeMap::new();
        let mut pending: Vec<PendingRequirement> = Vec::new();

        for (service_name, definition) in &source.blueprint.services {
            let component = &definition.component;
            let provider_key = self
                .select_provider(
                    source,
                    &component.resource_type,
                    component.interface.as_deref(),
                    component.provider.as_deref(),
                    context,
                )
                .await?;
            let provider = self.registry.get(&provider_key)?;
            let count = instance_count(source, service_name, &component.resource_type, &provider_key)?;
            debug!(service = %service_name, provider = %provider_key, count = count, "Planning service");

            let mut keys = Vec::new();
            for index in 0..count {
                let key = next_key.to_string();
                let request = TemplateRequest {
                    deployment: source,
                    resource_type: &component.resource_type,
                    service: service_name,
                    context,
                    index,
                    key: &key,
                    provider_key: &provider_key,
                    definition: Some(definition),
                    requirement: None,
                };
                let templates = provider.generate_template(&request).await?;
                if templates.is_empty() {
                    return Err(DeployerError::validation(format!(
                        "Provider '{provider_key}' produced no resources for service '{service_name}'"
                    )));
                }
                for template in templates {
                    let key = next_key.to_string();
                    next_key += 1;
                    let is_primary = template.resource_type == component.resource_type;
                    for requirement in &template.requires {
                        pending.push(PendingRequirement::new(service_name, &key, requirement.clone()));
                    }
                    if is_primary {
                        for requirement in &definition.requires {
                            pending.push(PendingRequirement::new(service_name, &key, requirement.clone()));
                        }
                    }
                    resources.insert(key.clone(), template.into_resource(&key));
                    keys.push(key);
                }
            }

            services.insert(
                service_name.clone(),
                ServicePlan {
                    provider: provider_key,
                    resource_type: component.resource_type.clone(),
                    resource_keys: keys,
                },
            );
        }

        let (requirements, passes) = self
            .resolve_requirements(source, context, &mut resources, pending, &mut next_key)
            .await?;

        check_circular_dependencies(&resources)?;
        validate_graph(&resources)?;

        let check_results = verify_providers(
            &self.registry,
            context,
            &resources,
            VerificationRequest {
                check_access: options.check_access,
                check_limits: options.check_limits,
                workers: self.config.verification_workers,
            },
        )
        .await?;
        let violations = check_results.iter().filter(|m| m.is_violation()).count();
        if violations > 0 {
            warn!(violations = violations, "Provider verification reported violations");
        }

        let mut candidate = source.clone();
        candidate.resources = resources.clone();
        candidate.plan = Some(PlanRecord {
            services,
            requirements,
            passes,
            planned_at: Utc::now(),
        });
        candidate.check_results = check_results;
        DeploymentStateMachine::transition(&mut candidate, DeploymentEvent::Plan)?;
        *deployment = candidate;

        log_deployment_operation(
            "plan",
            &deployment.id,
            Some(&deployment.tenant_id),
            &deployment.status.to_string(),
            Some(&format!("{} resources in {} passes", resources.len(), passes)),
        );
        self.events.publish(
            events::DEPLOYMENT_PLANNED,
            json!({
                "deployment_id": deployment.id,
                "tenant_id": deployment.tenant_id,
                "resources": resources.len(),
                "violations": violations,
            }),
        );
        info!(resources = resources.len(), passes = passes, "Deployment planned");
        Ok(resources)
    }

    /// Provider key serving `resource_type`: the explicit component provider,
    /// then the first environment binding declaring it, then the first binding
    /// whose catalog offers it.
    pub(super) async fn select_provider(
        &self,
        deployment: &Deployment,
        resource_type: &str,
        interface: Option<&str>,
        explicit: Option<&str>,
        context: &RequestContext,
    ) -> Result<String> {
        let environment = &deployment.environment;
        if let Some(key) = explicit {
            if !environment.providers.contains_key(key) {
                return Err(DeployerError::validation(format!(
                    "Provider '{key}' is not part of environment '{}'",
                    environment.name
                )));
            }
            return Ok(key.to_string());
        }

        if let Some(key) = environment.binding_for(resource_type, interface) {
            return Ok(key.to_string());
        }

        for (key, binding) in &environment.providers {
            if !binding.provides.is_empty() {
                continue;
            }
            let Ok(provider) = self.registry.get(key) else {
                warn!(provider = %key, "Environment references an unregistered provider");
                continue;
            };
            let catalog = self
                .catalog
                .get_catalog(provider.as_ref(), context, Some(resource_type))
                .await?;
            if catalog.provides(resource_type) {
                return Ok(key.clone());
            }
        }

        Err(DeployerError::validation(format!(
            "No provider in environment '{}' supplies resource type '{resource_type}'",
            environment.name
        )))
    }
}

fn check_required_options(deployment: &Deployment) -> Result<()> {
    let missing: Vec<&str> = deployment
        .blueprint
        .options
        .iter()
        .filter(|(name, option)| {
            option.required && option.default.is_none() && !deployment.inputs.contains_key(*name)
        })
        .map(|(name, _)| name.as_str())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DeployerError::validation(format!(
            "Missing required blueprint options: {}",
            missing.join(", ")
        )))
    }
}

fn instance_count(
    deployment: &Deployment,
    service: &str,
    resource_type: &str,
    provider_key: &str,
) -> Result<usize> {
    let value = SettingsResolver::new(deployment).get_setting(
        "count",
        Some(resource_type),
        Some(service),
        Some(provider_key),
        Some(json!(1)),
    );
    let count = match &value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match count {
        Some(n) if n >= 1 => Ok(n as usize),
        _ => Err(DeployerError::validation(format!(
            "Service '{service}' has invalid count {}",
            value.unwrap_or(Value::Null)
        ))),
    }
}
