use crate::error::{DeployerError, Result};
use crate::models::{Deployment, Operation};
use crate::state_machine::ResourceStatus;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Partial resource update reported by a completed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePostback {
    pub resource_key: String,
    #[serde(default)]
    pub status: Option<ResourceStatus>,
    #[serde(default)]
    pub status_detail: Option<String>,
    /// Instance fields to merge
    #[serde(default)]
    pub instance: BTreeMap<String, Value>,
}

impl ResourcePostback {
    pub fn new(resource_key: impl Into<String>) -> Self {
        Self {
            resource_key: resource_key.into(),
            status: None,
            status_detail: None,
            instance: BTreeMap::new(),
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.status_detail = Some(detail.into());
        self
    }

    pub fn with_instance(mut self, name: impl Into<String>, value: Value) -> Self {
        self.instance.insert(name.into(), value);
        self
    }
}

/// Merge postbacks into the deployment's resources
pub fn apply_postbacks(deployment: &mut Deployment, postbacks: &[ResourcePostback]) -> Result<()> {
    for postback in postbacks {
        let resource = deployment
            .resources
            .get_mut(&postback.resource_key)
            .ok_or_else(|| DeployerError::not_found("resource", postback.resource_key.clone()))?;
        if let Some(status) = postback.status {
            resource.status = status;
        }
        if postback.status_detail.is_some() {
            resource.status_detail = postback.status_detail.clone();
        }
        for (name, value) in &postback.instance {
            resource.instance.insert(name.clone(), value.clone());
        }
    }
    if !postbacks.is_empty() {
        deployment.updated_at = Utc::now();
    }
    Ok(())
}

/// Destination for postbacks produced during execution
#[async_trait]
pub trait PostbackSink: Send + Sync {
    async fn apply(&self, deployment_id: &str, postbacks: &[ResourcePostback]) -> Result<()>;

    /// Latest summary of a running workflow, sent after every task outcome
    async fn record_operation(&self, _deployment_id: &str, _operation: &Operation) -> Result<()> {
        Ok(())
    }
}
