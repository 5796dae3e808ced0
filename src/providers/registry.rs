//! # Provider Registry
//!
//! Thread-safe map from provider key to [`Provider`] implementation.
//!
//! The registry also acts as the default [`TaskDispatcher`]: a task's
//! `TaskCall::provider` selects the implementation that executes it.

use super::Provider;
use crate::error::{DeployerError, ProviderError, Result};
use crate::models::RequestContext;
use crate::workflow::{TaskCall, TaskDispatcher, TaskOutcome};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.keys())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under its own name. Replaces any previous entry.
    pub fn register(&self, provider: Arc<dyn Provider>) {
        let key = provider.name().to_string();
        if self.providers.write().insert(key.clone(), provider).is_some() {
            warn!(provider = %key, "Replaced existing provider registration");
        } else {
            info!(provider = %key, "Registered provider");
        }
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn Provider>> {
        self.providers
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| DeployerError::not_found("provider", key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.providers.read().contains_key(key)
    }

    /// Registered keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.providers.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }
}

#[async_trait]
impl TaskDispatcher for ProviderRegistry {
    async fn dispatch(&self, call: &TaskCall, context: &RequestContext) -> TaskOutcome {
        let provider = match self.get(&call.provider) {
            Ok(provider) => provider,
            Err(_) => {
                return TaskOutcome::Failed(ProviderError::fatal(format!(
                    "No provider registered for '{}'",
                    call.provider
                )))
            }
        };
        debug!(provider = %call.provider, operation = %call.operation, resource_key = ?call.resource_key, "Executing provider call");
        provider.execute(call, context).await
    }
}
