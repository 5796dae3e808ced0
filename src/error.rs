//! Error types for the deployment orchestrator.
//!

use crate::config::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// How a provider failure should be handled by the execution engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// The call failed but may succeed if retried
    Transient,
    /// The call cannot proceed yet; try again after a delay
    Resumable,
    /// Unrecoverable
    Fatal,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Resumable => write!(f, "resumable"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Error raised by a provider operation
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind} provider error: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    /// Message suitable for end users
    pub friendly_message: Option<String>,
    /// Delay requested by the provider before the next attempt
    pub retry_after: Option<Duration>,
    pub traceback: Option<String>,
}

impl ProviderError {
    fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            friendly_message: None,
            retry_after: None,
            traceback: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transient, message)
    }

    pub fn resumable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Resumable, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Fatal, message)
    }

    pub fn with_friendly_message(mut self, message: impl Into<String>) -> Self {
        self.friendly_message = Some(message.into());
        self
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }

    /// Stable error type name used in operation error payloads
    pub fn error_type(&self) -> &'static str {
        match self.kind {
            ProviderErrorKind::Transient => "ProviderTransientError",
            ProviderErrorKind::Resumable => "ProviderResumableError",
            ProviderErrorKind::Fatal => "ProviderFatalError",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeployerError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("State error: {0}")]
    StateError(String),
    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },
    #[error("Concurrent modification of {entity} {id}: expected revision {expected}, found {actual}")]
    ConcurrentModification {
        entity: String,
        id: String,
        expected: u64,
        actual: u64,
    },
    #[error("Persistence error: {0}")]
    PersistenceError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Stable error type name
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => "ValidationError",
            Self::StateError(_) => "StateError",
            Self::CircularDependency { .. } => "CircularDependencyError",
            Self::Provider(e) => e.error_type(),
            Self::NotFound { .. } => "NotFound",
            Self::ConcurrentModification { .. } => "ConcurrentModification",
            Self::PersistenceError(_) => "PersistenceError",
            Self::ConfigurationError(_) => "ConfigurationError",
            Self::Internal(_) => "InternalError",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.kind == ProviderErrorKind::Transient,
            Self::ConcurrentModification { .. } => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for DeployerError {
    fn from(error: serde_json::Error) -> Self {
        DeployerError::ValidationError(format!("JSON serialization error: {error}"))
    }
}

impl From<ConfigurationError> for DeployerError {
    fn from(error: ConfigurationError) -> Self {
        DeployerError::ConfigurationError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DeployerError>;
