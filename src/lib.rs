#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Deployer Core
//!
//! Planning and workflow orchestration core for multi-provider cloud
//! deployments.
//!
//! ## Overview
//!
//! A declarative blueprint (services, their component types, requirements and
//! options) is combined with an environment of provider bindings and user
//! inputs. The [`planning::Planner`] turns that into a resource graph; the
//! [`workflow::WorkflowSpecBuilder`] turns the graph into a task DAG of
//! provider calls; the [`workflow::WorkflowEngine`] drives the DAG to
//! completion with polling, transient retries and reset-and-retry of failed
//! provider chains.
//!
//! ```text
//! Blueprint + Environment + Inputs
//!          │
//!          ▼
//!       Planner ──▶ Resource Graph ──▶ Spec Builder ──▶ Task DAG
//!                                                          │
//!                       postbacks ◀── Workflow Engine ◀────┘
//!                           │               │
//!                           ▼               ▼ on failure
//!                      Deployment      Reset handler
//! ```
//!
//! ## Module Organization
//!
//! - [`models`] - blueprints, environments, deployments, resources
//! - [`state_machine`] - deployment lifecycle and task/workflow states
//! - [`providers`] - the provider trait, registry, catalogs and status mapping
//! - [`planning`] - settings resolution, planner, requirement binding
//! - [`workflow`] - task DAG, spec builder, engine and reset handler
//! - [`orchestration`] - error classification, backoff and the orchestrator facade
//! - [`persistence`] - compare-and-swap storage interface
//! - [`config`], [`logging`], [`events`], [`cache`] - ambient infrastructure
//!
//! ## Quick Start
//!
//! ```rust
//! use deployer_core::config::OrchestratorConfig;
//!
//! let config = OrchestratorConfig::default();
//! assert_eq!(config.planner.max_requirement_passes, 10);
//! assert_eq!(config.execution.max_concurrent_tasks, 32);
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod planning;
pub mod providers;
pub mod state_machine;
pub mod workflow;

pub use cache::{CacheService, InMemoryCache};
pub use config::OrchestratorConfig;
pub use error::{DeployerError, ProviderError, ProviderErrorKind, Result};
pub use events::{EventPublisher, PublishedEvent};
pub use models::{
    Blueprint, Deployment, Environment, RequestContext, Resource, ResourceGraph,
    ServiceDefinition,
};
pub use orchestration::Orchestrator;
pub use persistence::{DeploymentStore, InMemoryStore};
pub use planning::{Planner, SettingsResolver};
pub use providers::{Provider, ProviderRegistry, TemplateRequest};
pub use state_machine::{DeploymentStatus, ResourceStatus, TaskState, WorkflowStatus};
pub use workflow::{TaskDag, TaskOutcome, Workflow, WorkflowEngine, WorkflowSpecBuilder};
