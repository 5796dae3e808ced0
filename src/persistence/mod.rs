//! # Persistence
//!
//! Save/load interface for deployments and workflows. Storage itself is an
//! external concern; the orchestrator only needs keyed bodies with a revision
//! used for compare-and-swap on save.
//!
//! Secrets travel next to the body on save and are kept apart from it; `get_*`
//! never returns them.

pub mod memory;

pub use memory::InMemoryStore;

use crate::constants::system::MAX_SAVE_RETRIES;
use crate::error::{DeployerError, Result};
use crate::models::Deployment;
use crate::workflow::Workflow;
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Store `body` if its revision matches the stored one. Returns the saved
    /// body with its new revision.
    async fn save_deployment(
        &self,
        id: &str,
        body: &Deployment,
        secrets: Option<Value>,
        tenant_id: &str,
    ) -> Result<Deployment>;

    async fn get_deployment(&self, id: &str) -> Result<Deployment>;

    async fn save_workflow(
        &self,
        id: &str,
        body: &Workflow,
        secrets: Option<Value>,
        tenant_id: &str,
    ) -> Result<Workflow>;

    async fn get_workflow(&self, id: &str) -> Result<Workflow>;
}

/// Load-modify-save a deployment, retrying on compare-and-swap conflicts
pub async fn update_deployment<F>(
    store: &dyn DeploymentStore,
    id: &str,
    tenant_id: &str,
    mut update: F,
) -> Result<Deployment>
where
    F: FnMut(&mut Deployment) -> Result<()> + Send,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut deployment = store.get_deployment(id).await?;
        update(&mut deployment)?;
        match store.save_deployment(id, &deployment, None, tenant_id).await {
            Err(DeployerError::ConcurrentModification { expected, actual, .. })
                if attempt < MAX_SAVE_RETRIES =>
            {
                warn!(
                    deployment_id = %id,
                    attempt = attempt,
                    expected = expected,
                    actual = actual,
                    "Deployment changed underneath update, retrying"
                );
            }
            other => return other,
        }
    }
}
