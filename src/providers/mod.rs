//! # Provider Interface
//!
//! The contract every cloud provider adapter implements, plus the registry
//! that maps provider keys to implementations.
//!
//! ## Overview
//!
//! Providers participate in three phases:
//!
//! - **Planning**: [`Provider::generate_template`] proposes resources for a
//!   service; `verify_access`/`verify_limits` report on the tenant's account.
//! - **Spec building**: `add_resource_tasks`, `add_connection_tasks` and their
//!   delete counterparts append task chains to a [`TaskDag`].
//! - **Execution**: [`Provider::execute`] performs one remote call for a task
//!   and returns a [`TaskOutcome`].
//!
//! Providers are looked up by key through [`ProviderRegistry`], populated at
//! startup. No dynamic loading.

pub mod catalog;
pub mod registry;
pub mod status_map;

pub use catalog::{Catalog, CatalogService};
pub use registry::ProviderRegistry;
pub use status_map::StatusMapping;

use crate::error::Result;
use crate::models::{
    Deployment, Message, Relation, RequestContext, Requirement, Resource, ResourceTemplate,
    ServiceDefinition,
};
use crate::planning::SettingsResolver;
use crate::state_machine::ResourceStatus;
use crate::workflow::{TaskCall, TaskChain, TaskDag, TaskId, TaskOutcome};
use async_trait::async_trait;
use serde_json::Value;

/// Everything a provider needs to propose resources for one service instance
#[derive(Debug, Clone, Copy)]
pub struct TemplateRequest<'a> {
    pub deployment: &'a Deployment,
    pub resource_type: &'a str,
    pub service: &'a str,
    pub context: &'a RequestContext,
    /// Instance number within the service (0-based)
    pub index: usize,
    /// Resource key the first template will be stored under
    pub key: &'a str,
    /// Environment key the provider is bound under
    pub provider_key: &'a str,
    pub definition: Option<&'a ServiceDefinition>,
    /// Set when the resource is injected to satisfy a dedicated requirement
    pub requirement: Option<&'a Requirement>,
}

impl TemplateRequest<'_> {
    /// Resolve a setting for this resource through the standard precedence chain
    pub fn get_setting(&self, name: &str, default: Option<Value>) -> Option<Value> {
        SettingsResolver::new(self.deployment).get_setting(
            name,
            Some(self.resource_type),
            Some(self.service),
            Some(self.provider_key),
            default,
        )
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider key, e.g. "nova"
    fn name(&self) -> &str;

    async fn generate_template(&self, request: &TemplateRequest<'_>) -> Result<Vec<ResourceTemplate>>;

    /// Append the build chain for `resource`. The chain's root must wait on
    /// every task in `wait_on`.
    fn add_resource_tasks(
        &self,
        resource: &Resource,
        key: &str,
        dag: &mut TaskDag,
        deployment: &Deployment,
        context: &RequestContext,
        wait_on: &[TaskId],
    ) -> Result<TaskChain>;

    #[allow(clippy::too_many_arguments)]
    fn add_connection_tasks(
        &self,
        _resource: &Resource,
        _key: &str,
        _relation: &Relation,
        _relation_key: &str,
        _dag: &mut TaskDag,
        _deployment: &Deployment,
        _context: &RequestContext,
    ) -> Result<Option<TaskChain>> {
        Ok(None)
    }

    fn delete_resource_tasks(
        &self,
        _dag: &mut TaskDag,
        _context: &RequestContext,
        _deployment_id: &str,
        _resource: &Resource,
        _key: &str,
    ) -> Result<Option<TaskChain>> {
        Ok(None)
    }

    #[allow(clippy::too_many_arguments)]
    fn delete_connection_tasks(
        &self,
        _dag: &mut TaskDag,
        _context: &RequestContext,
        _deployment_id: &str,
        _resource: &Resource,
        _key: &str,
        _relation: &Relation,
        _relation_key: &str,
    ) -> Result<Option<TaskChain>> {
        Ok(None)
    }

    async fn verify_limits(
        &self,
        _context: &RequestContext,
        _resources: &[Resource],
    ) -> Result<Vec<Message>> {
        Ok(Vec::new())
    }

    async fn verify_access(&self, _context: &RequestContext) -> Result<Message> {
        Ok(Message::info(self.name(), "access", "Access not checked"))
    }

    async fn get_catalog(&self, context: &RequestContext, type_filter: Option<&str>) -> Result<Catalog>;

    /// Perform the remote call behind a task
    async fn execute(&self, call: &TaskCall, context: &RequestContext) -> TaskOutcome;

    fn status_mapping(&self) -> StatusMapping {
        StatusMapping::standard()
    }

    fn translate_status(&self, raw: &str) -> ResourceStatus {
        self.status_mapping().translate(raw)
    }
}
