//! # Provider Verification
//!
//! Optional access and limit checks run at the end of planning. Each involved
//! provider is queried concurrently through a bounded pool and all results are
//! joined before planning continues. Violations reported by a provider are
//! only recorded; the caller decides what to do with them. A provider that
//! fails to answer aborts planning with its error unchanged.

use crate::constants::system::MAX_VERIFICATION_WORKERS;
use crate::error::Result;
use crate::models::{Message, RequestContext, Resource, ResourceGraph};
use crate::providers::ProviderRegistry;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerificationRequest {
    pub check_access: bool,
    pub check_limits: bool,
    /// Clamped to 1..=16
    pub workers: usize,
}

impl VerificationRequest {
    pub fn is_empty(&self) -> bool {
        !self.check_access && !self.check_limits
    }
}

enum Check {
    Access,
    Limits(Vec<Resource>),
}

pub async fn verify_providers(
    registry: &ProviderRegistry,
    context: &RequestContext,
    resources: &ResourceGraph,
    request: VerificationRequest,
) -> Result<Vec<Message>> {
    if request.is_empty() {
        return Ok(Vec::new());
    }

    let mut by_provider: BTreeMap<&str, Vec<Resource>> = BTreeMap::new();
    for resource in resources.values() {
        by_provider
            .entry(resource.provider.as_str())
            .or_default()
            .push(resource.clone());
    }

    let mut jobs: Vec<(String, Check)> = Vec::new();
    for (provider, provider_resources) in by_provider {
        if request.check_access {
            jobs.push((provider.to_string(), Check::Access));
        }
        if request.check_limits {
            jobs.push((provider.to_string(), Check::Limits(provider_resources)));
        }
    }

    let workers = request.workers.clamp(1, MAX_VERIFICATION_WORKERS);
    debug!(jobs = jobs.len(), workers = workers, "Running provider verification");

    // Every check is joined before the first error is surfaced
    let results: Vec<Result<Vec<Message>>> = stream::iter(jobs)
        .map(|(provider_key, check)| async move {
            let provider = registry.get(&provider_key)?;
            let checked = match check {
                Check::Access => provider.verify_access(context).await.map(|m| vec![m]),
                Check::Limits(resources) => provider.verify_limits(context, &resources).await,
            };
            if let Err(e) = &checked {
                warn!(provider = %provider_key, error = %e, "Provider verification failed");
            }
            checked
        })
        .buffer_unordered(workers)
        .collect()
        .await;

    let mut messages = Vec::new();
    for result in results {
        messages.extend(result?);
    }
    // Completion order is arbitrary
    messages.sort_by(|a, b| (&a.provider, &a.kind, &a.message).cmp(&(&b.provider, &b.kind, &b.message)));
    Ok(messages)
}
