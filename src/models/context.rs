use serde::{Deserialize, Serialize};

/// Caller context passed unchanged from the API layer into planning and execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub auth_token: Option<String>,
    pub tenant_id: String,
    pub username: Option<String>,
    /// Providers should not touch real infrastructure when set
    pub simulation: bool,
    pub roles: Vec<String>,
    pub region: Option<String>,
}

impl RequestContext {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            ..Default::default()
        }
    }

    pub fn with_simulation(mut self, simulation: bool) -> Self {
        self.simulation = simulation;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
