//! # Provider Catalogs
//!
//! What a provider can build for a tenant, memoized through the injected
//! [`CacheService`].

use super::Provider;
use crate::cache::CacheService;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::models::RequestContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Resource types a provider offers, with provider-specific detail
/// (flavors, images, regions) per type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub resource_types: BTreeMap<String, Value>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, resource_type: impl Into<String>, detail: Value) -> Self {
        self.resource_types.insert(resource_type.into(), detail);
        self
    }

    pub fn provides(&self, resource_type: &str) -> bool {
        self.resource_types.contains_key(resource_type)
    }

    /// Copy restricted to one resource type
    pub fn filtered(&self, resource_type: Option<&str>) -> Self {
        match resource_type {
            Some(wanted) => Self {
                resource_types: self
                    .resource_types
                    .iter()
                    .filter(|(name, _)| name.as_str() == wanted)
                    .map(|(name, detail)| (name.clone(), detail.clone()))
                    .collect(),
            },
            None => self.clone(),
        }
    }
}

pub struct CatalogService {
    cache: Option<Arc<dyn CacheService>>,
    ttl: Duration,
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogService")
            .field("cached", &self.cache.is_some())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl CatalogService {
    pub fn new(cache: Arc<dyn CacheService>, config: &CacheConfig) -> Self {
        Self {
            cache: config.enabled.then_some(cache),
            ttl: config.catalog_ttl(),
        }
    }

    /// Always asks the provider
    pub fn uncached() -> Self {
        Self {
            cache: None,
            ttl: Duration::ZERO,
        }
    }

    fn cache_key(tenant_id: &str, provider: &str, type_filter: Option<&str>) -> String {
        format!("catalog:{tenant_id}:{provider}:{}", type_filter.unwrap_or("*"))
    }

    pub async fn get_catalog(
        &self,
        provider: &dyn Provider,
        context: &RequestContext,
        type_filter: Option<&str>,
    ) -> Result<Catalog> {
        let key = Self::cache_key(&context.tenant_id, provider.name(), type_filter);
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&key) {
                match serde_json::from_value::<Catalog>(cached) {
                    Ok(catalog) => {
                        debug!(cache_key = %key, "Catalog cache hit");
                        return Ok(catalog);
                    }
                    Err(e) => {
                        warn!(cache_key = %key, error = %e, "Discarding unreadable cached catalog");
                        cache.invalidate(&key);
                    }
                }
            }
        }

        let catalog = provider.get_catalog(context, type_filter).await?;
        if let Some(cache) = &self.cache {
            cache.set(&key, serde_json::to_value(&catalog)?, self.ttl);
        }
        Ok(catalog)
    }

    /// Drop every cached catalog of `provider` for a tenant
    pub fn invalidate_provider(&self, tenant_id: &str, provider: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate_prefix(&format!("catalog:{tenant_id}:{provider}:"));
        }
    }
}
