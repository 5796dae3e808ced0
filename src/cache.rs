//! # Cache Service
//!
//! Explicitly injected key/value cache with per-entry TTL. Components that
//! memoize provider responses (catalog lookups) receive a `CacheService`
//! rather than reaching for process-wide state.

use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};

pub trait CacheService: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value, ttl: Duration);
    fn invalidate(&self, key: &str);
    /// Drop every entry whose key starts with `prefix`
    fn invalidate_prefix(&self, prefix: &str);
}

#[derive(Debug)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// Concurrent in-memory cache
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheService for InMemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    fn invalidate_prefix(&self, prefix: &str) {
        self.entries.retain(|key, _| !key.starts_with(prefix));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_set_invalidate() {
        let cache = InMemoryCache::new();
        cache.set("catalog:t1:nova", json!({"compute": {}}), Duration::from_secs(60));
        assert_eq!(cache.get("catalog:t1:nova"), Some(json!({"compute": {}})));

        cache.invalidate("catalog:t1:nova");
        assert_eq!(cache.get("catalog:t1:nova"), None);
    }

    #[test]
    fn test_expired_entries_are_evicted() {
        let cache = InMemoryCache::new();
        cache.set("k", json!(1), Duration::ZERO);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_prefix() {
        let cache = InMemoryCache::new();
        cache.set("catalog:t1:nova", json!(1), Duration::from_secs(60));
        cache.set("catalog:t1:cbs", json!(2), Duration::from_secs(60));
        cache.set("catalog:t2:nova", json!(3), Duration::from_secs(60));

        cache.invalidate_prefix("catalog:t1:");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("catalog:t2:nova"), Some(json!(3)));
    }
}
