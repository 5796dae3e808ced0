//! # Requirement Resolution
//!
//! Binds every "requires" entry of a planned resource to a concrete target.
//!
//! - **Dedicated** requirements inject a new supporting resource from the
//!   provider serving the required type (e.g. a block-storage volume for a
//!   database server) and relate the requiring resource to it.
//! - **Shared** requirements bind to the single other service whose resources
//!   provide a compatible interface. No candidate yet defers the requirement
//!   to a later pass; candidates from more than one service are ambiguous.
//!
//! Injected resources may bring requirements of their own, so resolution runs
//! in passes until nothing is pending. The number of passes is bounded.

use super::planner::Planner;
use crate::error::{DeployerError, Result};
use crate::models::{
    Deployment, Relation, RelationKind, RequestContext, Requirement, ResolvedRequirement,
    ResourceGraph,
};
use crate::providers::TemplateRequest;
use tracing::debug;

/// A requirement still waiting for a target
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequirement {
    pub service: String,
    /// Key of the requiring resource
    pub source: String,
    pub requirement: Requirement,
}

impl PendingRequirement {
    pub fn new(service: &str, source: &str, requirement: Requirement) -> Self {
        Self {
            service: service.to_string(),
            source: source.to_string(),
            requirement,
        }
    }
}

impl Planner {
    /// Resolve `pending` into relations on `resources`. Returns the resolved
    /// requirements and the number of passes used.
    pub(super) async fn resolve_requirements(
        &self,
        deployment: &Deployment,
        context: &RequestContext,
        resources: &mut ResourceGraph,
        mut pending: Vec<PendingRequirement>,
        next_key: &mut usize,
    ) -> Result<(Vec<ResolvedRequirement>, u32)> {
        let max_passes = self.config.max_requirement_passes.max(1);
        let mut resolved = Vec::new();
        let mut passes = 0u32;

        while !pending.is_empty() {
            if passes >= max_passes {
                return Err(DeployerError::validation(format!(
                    "Requirements could not be resolved after {max_passes} passes: {}",
                    describe(&pending)
                )));
            }
            passes += 1;

            let mut deferred = Vec::new();
            let mut progressed = false;
            for item in std::mem::take(&mut pending) {
                if item.requirement.dedicated {
                    let (record, injected) = self
                        .inject_dedicated(deployment, context, resources, &item, next_key)
                        .await?;
                    resolved.push(record);
                    pending.extend(injected);
                    progressed = true;
                } else if let Some(record) = bind_shared(deployment, resources, &item)? {
                    resolved.push(record);
                    progressed = true;
                } else {
                    deferred.push(item);
                }
            }
            debug!(pass = passes, resolved = resolved.len(), deferred = deferred.len(), "Requirement pass");

            // Nothing new can appear without progress
            if !progressed && !deferred.is_empty() {
                return Err(DeployerError::validation(format!(
                    "No service provides a match for: {}",
                    describe(&deferred)
                )));
            }
            pending.extend(deferred);
        }

        Ok((resolved, passes))
    }

    async fn inject_dedicated(
        &self,
        deployment: &Deployment,
        context: &RequestContext,
        resources: &mut ResourceGraph,
        item: &PendingRequirement,
        next_key: &mut usize,
    ) -> Result<(ResolvedRequirement, Vec<PendingRequirement>)> {
        let requirement = &item.requirement;
        let provider_key = self
            .select_provider(
                deployment,
                &requirement.resource_type,
                requirement.interface.as_deref(),
                None,
                context,
            )
            .await?;
        let provider = self.registry.get(&provider_key)?;

        let key = next_key.to_string();
        let request = TemplateRequest {
            deployment,
            resource_type: &requirement.resource_type,
            service: &item.service,
            context,
            index: 0,
            key: &key,
            provider_key: &provider_key,
            definition: deployment.blueprint.services.get(&item.service),
            requirement: Some(requirement),
        };
        let templates = provider.generate_template(&request).await?;
        if templates.is_empty() {
            return Err(DeployerError::validation(format!(
                "Provider '{provider_key}' produced no '{}' resource for service '{}'",
                requirement.resource_type, item.service
            )));
        }

        let mut target = None;
        let mut injected = Vec::new();
        for template in templates {
            let key = next_key.to_string();
            *next_key += 1;
            for nested in &template.requires {
                injected.push(PendingRequirement::new(&item.service, &key, nested.clone()));
            }
            if target.is_none() && template.resource_type == requirement.resource_type {
                target = Some(key.clone());
            }
            resources.insert(key.clone(), template.into_resource(&key));
        }
        let target = target.ok_or_else(|| {
            DeployerError::validation(format!(
                "Provider '{provider_key}' did not produce a '{}' resource",
                requirement.resource_type
            ))
        })?;

        let relation_key = add_relation(resources, &item.source, &target, requirement, &provider_key)?;
        debug!(source = %item.source, target = %target, relation_key = %relation_key, "Injected dedicated resource");
        Ok((
            ResolvedRequirement {
                service: item.service.clone(),
                source: item.source.clone(),
                target,
                relation_key,
                relation: requirement.relation,
                dedicated: true,
            },
            injected,
        ))
    }
}

/// Bind a shared requirement to the one other service that provides it
fn bind_shared(
    deployment: &Deployment,
    resources: &mut ResourceGraph,
    item: &PendingRequirement,
) -> Result<Option<ResolvedRequirement>> {
    let requirement = &item.requirement;
    let wanted_interface = requirement.interface.as_deref();

    let candidates: Vec<(String, String, String)> = resources
        .iter()
        .filter(|(_, r)| r.service != item.service)
        .filter(|(_, r)| {
            let by_resource = r
                .provides
                .iter()
                .any(|i| i.satisfies(&requirement.resource_type, wanted_interface));
            let by_service = deployment.blueprint.services.get(&r.service).is_some_and(|s| {
                r.resource_type == s.component.resource_type
                    && s.provides
                        .iter()
                        .any(|i| i.satisfies(&requirement.resource_type, wanted_interface))
            });
            by_resource || by_service
        })
        .map(|(key, r)| (key.clone(), r.service.clone(), r.provider.clone()))
        .collect();

    let Some((target, target_service, target_provider)) = candidates.first().cloned() else {
        return Ok(None);
    };
    if candidates.iter().any(|(_, service, _)| *service != target_service) {
        let mut services: Vec<&str> = candidates.iter().map(|(_, s, _)| s.as_str()).collect();
        services.sort_unstable();
        services.dedup();
        return Err(DeployerError::validation(format!(
            "Requirement '{}' of service '{}' is ambiguous; provided by: {}",
            requirement.resource_type,
            item.service,
            services.join(", ")
        )));
    }

    let relation_key = add_relation(resources, &item.source, &target, requirement, &target_provider)?;
    Ok(Some(ResolvedRequirement {
        service: item.service.clone(),
        source: item.source.clone(),
        target,
        relation_key,
        relation: requirement.relation,
        dedicated: false,
    }))
}

/// Store the relation on the source resource; key is
/// `{target_provider}-{relation_name}-{target_key}`
fn add_relation(
    resources: &mut ResourceGraph,
    source: &str,
    target: &str,
    requirement: &Requirement,
    target_provider: &str,
) -> Result<String> {
    let name = requirement.relation_name();
    let relation_key = format!("{target_provider}-{name}-{target}");
    if !resources.contains_key(target) {
        return Err(DeployerError::not_found("resource", target));
    }
    let source_resource = resources
        .get_mut(source)
        .ok_or_else(|| DeployerError::not_found("resource", source))?;
    source_resource.relations.insert(
        relation_key.clone(),
        Relation {
            name,
            kind: requirement.relation,
            interface: requirement.interface.clone(),
            source: source.to_string(),
            target: target.to_string(),
        },
    );

    if requirement.relation == RelationKind::Host {
        if let Some(existing) = source_resource.hosted_on.as_deref() {
            if existing != target {
                return Err(DeployerError::validation(format!(
                    "Resource {source} is already hosted on {existing}"
                )));
            }
        }
        source_resource.hosted_on = Some(target.to_string());
        if let Some(host) = resources.get_mut(target) {
            if !host.hosts.iter().any(|k| k == source) {
                host.hosts.push(source.to_string());
            }
        }
    }
    Ok(relation_key)
}

fn describe(pending: &[PendingRequirement]) -> String {
    pending
        .iter()
        .map(|p| {
            format!(
                "{} (resource {}) requires {}",
                p.service, p.source, p.requirement.resource_type
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}
