use crate::state_machine::ResourceStatus;
use std::collections::HashMap;

/// Normalizes raw provider status strings into [`ResourceStatus`]
#[derive(Debug, Clone)]
pub struct StatusMapping {
    entries: HashMap<String, ResourceStatus>,
    fallback: ResourceStatus,
}

impl StatusMapping {
    /// Mapping shared by most compute and storage APIs
    pub fn standard() -> Self {
        let mut mapping = Self {
            entries: HashMap::new(),
            fallback: ResourceStatus::Configure,
        };
        for (raw, status) in [
            ("NEW", ResourceStatus::New),
            ("BUILD", ResourceStatus::Build),
            ("BUILDING", ResourceStatus::Build),
            ("CREATING", ResourceStatus::Build),
            ("REBUILD", ResourceStatus::Build),
            ("RESIZE", ResourceStatus::Configure),
            ("VERIFY_RESIZE", ResourceStatus::Configure),
            ("CONFIGURING", ResourceStatus::Configure),
            ("ACTIVE", ResourceStatus::Active),
            ("AVAILABLE", ResourceStatus::Active),
            ("IN-USE", ResourceStatus::Active),
            ("ONLINE", ResourceStatus::Active),
            ("SHUTOFF", ResourceStatus::Error),
            ("ERROR", ResourceStatus::Error),
            ("ERROR_DELETING", ResourceStatus::Error),
            ("DELETING", ResourceStatus::Deleting),
            ("PENDING_DELETE", ResourceStatus::Deleting),
            ("DELETED", ResourceStatus::Deleted),
        ] {
            mapping.entries.insert(raw.to_string(), status);
        }
        mapping
    }

    pub fn with_entry(mut self, raw: &str, status: ResourceStatus) -> Self {
        self.entries.insert(raw.to_ascii_uppercase(), status);
        self
    }

    /// Status used for unrecognized values
    pub fn with_fallback(mut self, status: ResourceStatus) -> Self {
        self.fallback = status;
        self
    }

    pub fn translate(&self, raw: &str) -> ResourceStatus {
        self.entries
            .get(&raw.trim().to_ascii_uppercase())
            .copied()
            .unwrap_or(self.fallback)
    }
}

impl Default for StatusMapping {
    fn default() -> Self {
        Self::standard()
    }
}
