//! # Task Failure Classification
//!
//! Maps a failed provider call plus its execution context onto a handling
//! decision for the workflow engine.
//!
//! ## Overview
//!
//! Providers report failures as [`ProviderError`] with a coarse kind
//! (transient, resumable, fatal). The classifier refines that into an
//! [`ErrorCategory`], decides whether the engine should reschedule the task,
//! computes the delay, and attaches remediation hints that end up in the
//! task's exception payload.
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ ProviderError   │────▶│ ErrorClassifier │────▶│ Classification  │
//! │ + ErrorContext  │     │                 │     │ (retry / delay) │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use deployer_core::error::ProviderError;
//! use deployer_core::orchestration::error_classifier::{
//!     ErrorClassifier, ErrorContext, StandardErrorClassifier,
//! };
//! use deployer_core::workflow::TaskId;
//!
//! let classifier = StandardErrorClassifier::default();
//! let context = ErrorContext {
//!     task_id: TaskId(4),
//!     task_name: "Create Server".to_string(),
//!     provider: "nova".to_string(),
//!     attempt_number: 1,
//!     max_attempts: 3,
//!     polls: 0,
//!     max_polls: 10,
//! };
//!
//! let classification =
//!     classifier.classify_error(&ProviderError::transient("connection reset"), &context);
//! assert!(classification.is_retryable);
//! ```

use super::backoff_calculator::BackoffCalculator;
use crate::config::ExecutionConfig;
use crate::error::{ProviderError, ProviderErrorKind};
use crate::workflow::TaskId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Context information for error classification
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub task_id: TaskId,
    pub task_name: String,
    pub provider: String,

    /// Current attempt number (1-based)
    pub attempt_number: u32,

    /// Maximum allowed attempts
    pub max_attempts: u32,

    /// Reschedules already spent waiting on the provider
    pub polls: u32,
    pub max_polls: u32,
}

/// Result of error classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub error_category: ErrorCategory,

    /// Reschedule now as a retry of a transient failure
    pub is_retryable: bool,

    /// Reschedule as a wait on external progress
    pub is_resumable: bool,

    pub retry_delay: Option<Duration>,
    pub error_code: String,
    pub error_message: String,
    pub remediation_suggestions: Vec<String>,
    pub is_final_attempt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Permanent error - will never succeed if retried
    Permanent,
    /// Transient error - may succeed on retry
    Transient,
    RateLimit,
    Network,
    /// Provider resource not ready yet
    Waiting,
    /// Credentials, quotas or settings need operator attention
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Permanent => write!(f, "Permanent"),
            ErrorCategory::Transient => write!(f, "Transient"),
            ErrorCategory::RateLimit => write!(f, "Rate Limit"),
            ErrorCategory::Network => write!(f, "Network"),
            ErrorCategory::Waiting => write!(f, "Waiting"),
            ErrorCategory::Configuration => write!(f, "Configuration"),
        }
    }
}

/// Trait for error classification strategies
pub trait ErrorClassifier: Send + Sync {
    fn classify_error(&self, error: &ProviderError, context: &ErrorContext) -> ErrorClassification;

    fn classifier_name(&self) -> &'static str;
}

#[derive(Debug, Clone)]
pub struct StandardErrorClassifier {
    backoff: BackoffCalculator,
    resume_delay: Duration,
    rate_limit_delay: Duration,
}

impl Default for StandardErrorClassifier {
    fn default() -> Self {
        Self::from_config(&ExecutionConfig::default())
    }
}

impl StandardErrorClassifier {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        let backoff = BackoffCalculator::new(config.backoff.clone());
        let rate_limit_delay = backoff.max_delay().min(Duration::from_secs(60));
        Self {
            backoff,
            resume_delay: config.resume_delay(),
            rate_limit_delay,
        }
    }

    fn classify_resumable(&self, error: &ProviderError, context: &ErrorContext) -> ErrorClassification {
        let is_resumable = context.polls < context.max_polls;
        ErrorClassification {
            error_category: ErrorCategory::Waiting,
            is_retryable: false,
            is_resumable,
            retry_delay: is_resumable.then(|| error.retry_after.unwrap_or(self.resume_delay)),
            error_code: "PROVIDER_NOT_READY".to_string(),
            error_message: format!(
                "Task '{}' waiting on {}: {}",
                context.task_name, context.provider, error.message
            ),
            remediation_suggestions: vec![
                "Check the resource status in the provider console".to_string(),
                "Resume the task once the provider reports progress".to_string(),
            ],
            is_final_attempt: !is_resumable,
        }
    }

    fn classify_transient(&self, error: &ProviderError, context: &ErrorContext) -> ErrorClassification {
        let reason = error.message.to_lowercase();
        let (category, code, suggestions, requested) = if reason.contains("rate limit")
            || reason.contains("over limit")
            || reason.contains("429")
        {
            (
                ErrorCategory::RateLimit,
                "PROVIDER_RATE_LIMITED",
                vec!["Reduce concurrent operations against this provider".to_string()],
                Some(error.retry_after.unwrap_or(self.rate_limit_delay)),
            )
        } else if reason.contains("timeout")
            || reason.contains("timed out")
            || reason.contains("connection")
            || reason.contains("unreachable")
        {
            (
                ErrorCategory::Network,
                "PROVIDER_NETWORK_ERROR",
                vec![
                    "Verify the provider endpoint is reachable".to_string(),
                    "Check provider status pages for outages".to_string(),
                ],
                error.retry_after,
            )
        } else {
            (
                ErrorCategory::Transient,
                "PROVIDER_TRANSIENT_ERROR",
                vec!["Retry the operation".to_string()],
                error.retry_after,
            )
        };

        let is_retryable = context.attempt_number < context.max_attempts;
        ErrorClassification {
            error_category: category,
            is_retryable,
            is_resumable: false,
            retry_delay: is_retryable
                .then(|| self.backoff.calculate(context.attempt_number, requested)),
            error_code: code.to_string(),
            error_message: format!(
                "Task '{}' failed on {} (attempt {}/{}): {}",
                context.task_name,
                context.provider,
                context.attempt_number,
                context.max_attempts,
                error.message
            ),
            remediation_suggestions: suggestions,
            is_final_attempt: !is_retryable,
        }
    }

    fn classify_fatal(&self, error: &ProviderError, context: &ErrorContext) -> ErrorClassification {
        let reason = error.message.to_lowercase();
        let (category, code, suggestions) = if reason.contains("unauthorized")
            || reason.contains("forbidden")
            || reason.contains("credential")
            || reason.contains("quota")
        {
            (
                ErrorCategory::Configuration,
                "PROVIDER_CONFIGURATION_ERROR",
                vec![
                    "Verify provider credentials for this tenant".to_string(),
                    "Check account quotas and limits".to_string(),
                ],
            )
        } else {
            (
                ErrorCategory::Permanent,
                "PROVIDER_FATAL_ERROR",
                vec!["Review the deployment inputs for this resource".to_string()],
            )
        };

        ErrorClassification {
            error_category: category,
            is_retryable: false,
            is_resumable: false,
            retry_delay: None,
            error_code: code.to_string(),
            error_message: format!(
                "Task '{}' failed permanently on {}: {}",
                context.task_name, context.provider, error.message
            ),
            remediation_suggestions: suggestions,
            is_final_attempt: true,
        }
    }
}

impl ErrorClassifier for StandardErrorClassifier {
    fn classify_error(&self, error: &ProviderError, context: &ErrorContext) -> ErrorClassification {
        match error.kind {
            ProviderErrorKind::Resumable => self.classify_resumable(error, context),
            ProviderErrorKind::Transient => self.classify_transient(error, context),
            ProviderErrorKind::Fatal => self.classify_fatal(error, context),
        }
    }

    fn classifier_name(&self) -> &'static str {
        "StandardErrorClassifier"
    }
}
