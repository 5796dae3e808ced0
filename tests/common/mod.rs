//! Shared fixtures for integration tests
#![allow(dead_code)]

pub mod providers;
pub mod strategies;

use deployer_core::cache::InMemoryCache;
use deployer_core::config::{BackoffConfig, ExecutionConfig, OrchestratorConfig, PlannerConfig};
use deployer_core::events::PublishedEvent;
use deployer_core::models::{
    Blueprint, BlueprintOption, Deployment, Environment, Interface, OptionTarget, ProviderBinding,
    RelationKind, RequestContext, Requirement, ServiceDefinition,
};
use deployer_core::persistence::InMemoryStore;
use deployer_core::planning::Planner;
use deployer_core::providers::{CatalogService, ProviderRegistry};
use deployer_core::Orchestrator;
use providers::{Script, ServerProvider, VolumeProvider};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;

pub const TENANT: &str = "tenant-1";

pub fn context() -> RequestContext {
    RequestContext::new(TENANT)
}

/// nova serves compute, cbs serves volumes
pub fn environment() -> Environment {
    Environment::new("test").with_provider(
        "nova",
        ProviderBinding::default().providing(Interface::new("compute")),
    )
    .with_provider(
        "cbs",
        ProviderBinding::default().providing(Interface::new("volume")),
    )
}

/// "db" is a server with a dedicated attached volume sized by the
/// `disk_size` option
pub fn db_service() -> ServiceDefinition {
    ServiceDefinition::new("compute")
        .requiring(Requirement::new("volume", RelationKind::Attach).dedicated())
}

pub fn disk_size_option() -> BlueprintOption {
    BlueprintOption {
        default: Some(json!(100)),
        required: false,
        constrains: vec![OptionTarget {
            service: Some("db".into()),
            resource_type: Some("volume".into()),
            setting: "size".into(),
        }],
    }
}

pub fn db_blueprint() -> Blueprint {
    Blueprint::new("bp-db", "database")
        .with_service("db", db_service())
        .with_option("disk_size", disk_size_option())
}

pub fn wordpress_blueprint() -> Blueprint {
    Blueprint::new("bp-wp", "wordpress")
        .with_service("web", ServiceDefinition::new("compute"))
        .with_service("db", db_service())
        .with_option("disk_size", disk_size_option())
}

pub fn deployment(id: &str, blueprint: Blueprint) -> Deployment {
    Deployment::new(id, TENANT, blueprint, environment())
}

pub struct Providers {
    pub script: Arc<Script>,
    pub servers: Arc<ServerProvider>,
    pub registry: Arc<ProviderRegistry>,
}

pub fn providers() -> Providers {
    let script = Arc::new(Script::new());
    let servers = Arc::new(ServerProvider::new(Arc::clone(&script)));
    let registry = ProviderRegistry::new();
    registry.register(servers.clone());
    registry.register(Arc::new(VolumeProvider::new(Arc::clone(&script))));
    Providers {
        script,
        servers,
        registry: Arc::new(registry),
    }
}

pub fn planner(registry: &Arc<ProviderRegistry>) -> Planner {
    Planner::new(
        Arc::clone(registry),
        Arc::new(CatalogService::uncached()),
        PlannerConfig::default(),
    )
}

/// Millisecond delays so retry paths run quickly
pub fn fast_execution() -> ExecutionConfig {
    ExecutionConfig {
        resume_delay_ms: 1,
        backoff: BackoffConfig {
            base_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
            jitter_enabled: false,
            max_jitter: 0.0,
        },
        ..ExecutionConfig::default()
    }
}

pub fn orchestrator(registry: &Arc<ProviderRegistry>) -> (Orchestrator, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let config = OrchestratorConfig {
        execution: fast_execution(),
        ..OrchestratorConfig::default()
    };
    let orchestrator = Orchestrator::new(
        config,
        Arc::clone(registry),
        store.clone(),
        Arc::new(InMemoryCache::new()),
    )
    .expect("default configuration is valid");
    (orchestrator, store)
}

/// Everything published so far
pub fn drain(receiver: &mut broadcast::Receiver<PublishedEvent>) -> Vec<PublishedEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
