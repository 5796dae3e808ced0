use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// Result of a provider access or limit check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub provider: String,
    /// e.g. "access" or "limits"
    pub kind: String,
    pub level: MessageLevel,
    pub message: String,
}

impl Message {
    pub fn info(provider: impl Into<String>, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind: kind.into(),
            level: MessageLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(provider: impl Into<String>, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Warning,
            ..Self::info(provider, kind, message)
        }
    }

    pub fn error(provider: impl Into<String>, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            ..Self::info(provider, kind, message)
        }
    }

    pub fn is_violation(&self) -> bool {
        self.level != MessageLevel::Info
    }
}
