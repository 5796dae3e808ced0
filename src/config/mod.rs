//! # Orchestrator Configuration
//!
//! Typed configuration for the planner, workflow builder and execution engine.
//!
//! ## Overview
//!
//! Every section carries serde defaults so a partial (or absent) configuration
//! file still yields a usable [`OrchestratorConfig`]. Loading from files and
//! environment variables lives in [`loader`].
//!
//! ```rust
//! use deployer_core::config::OrchestratorConfig;
//!
//! let config = OrchestratorConfig::default();
//! assert_eq!(config.workflow.default_auto_retry_count, 3);
//! assert!(config.validate().is_ok());
//! ```

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::system;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub planner: PlannerConfig,
    pub workflow: WorkflowConfig,
    pub execution: ExecutionConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Bound on requirement-resolution passes before planning fails
    pub max_requirement_passes: u32,
    /// Concurrent provider verification calls (1..=16)
    pub verification_workers: usize,
    pub check_access: bool,
    pub check_limits: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_requirement_passes: system::DEFAULT_MAX_REQUIREMENT_PASSES,
            verification_workers: system::MAX_VERIFICATION_WORKERS,
            check_access: false,
            check_limits: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Reset budget assigned to provider tasks that do not set their own
    pub default_auto_retry_count: u32,
    pub default_estimated_duration_secs: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            default_auto_retry_count: system::DEFAULT_AUTO_RETRY_COUNT,
            default_estimated_duration_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Dispatch attempts per task for transient failures before the error is terminal
    pub max_attempts: u32,
    pub max_concurrent_tasks: usize,
    /// Reschedules allowed for resumable outcomes before the task errors
    pub max_wait_polls: u32,
    pub resume_delay_ms: u64,
    pub backoff: BackoffConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_attempts: system::DEFAULT_MAX_ATTEMPTS,
            max_concurrent_tasks: 32,
            max_wait_polls: system::DEFAULT_MAX_WAIT_POLLS,
            resume_delay_ms: 30_000,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ExecutionConfig {
    pub fn resume_delay(&self) -> Duration {
        Duration::from_millis(self.resume_delay_ms)
    }
}

/// Exponential backoff parameters for transient task failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter_enabled: bool,
    /// Maximum jitter fraction (0.0 to 1.0)
    pub max_jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 300_000,
            multiplier: 2.0,
            jitter_enabled: true,
            max_jitter: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub catalog_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            catalog_ttl_seconds: 3600,
        }
    }
}

impl CacheConfig {
    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_seconds)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Overrides the environment-derived level when set
    pub level: Option<String>,
    pub json: bool,
}

impl OrchestratorConfig {
    /// Check value ranges the type system cannot express
    pub fn validate(&self) -> ConfigResult<()> {
        if self.planner.max_requirement_passes == 0 {
            return Err(ConfigurationError::invalid_value(
                "planner.max_requirement_passes",
                self.planner.max_requirement_passes,
                "must be at least 1",
            ));
        }
        if self.planner.verification_workers == 0
            || self.planner.verification_workers > system::MAX_VERIFICATION_WORKERS
        {
            return Err(ConfigurationError::invalid_value(
                "planner.verification_workers",
                self.planner.verification_workers,
                format!("must be between 1 and {}", system::MAX_VERIFICATION_WORKERS),
            ));
        }
        if self.execution.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.max_attempts",
                self.execution.max_attempts,
                "must be at least 1",
            ));
        }
        if self.execution.max_concurrent_tasks == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.max_concurrent_tasks",
                self.execution.max_concurrent_tasks,
                "must be at least 1",
            ));
        }
        let backoff = &self.execution.backoff;
        if backoff.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "execution.backoff.multiplier",
                backoff.multiplier,
                "must be >= 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&backoff.max_jitter) {
            return Err(ConfigurationError::invalid_value(
                "execution.backoff.max_jitter",
                backoff.max_jitter,
                "must be within 0.0..=1.0",
            ));
        }
        if backoff.max_delay_ms < backoff.base_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "execution.backoff.max_delay_ms",
                backoff.max_delay_ms,
                "must not be smaller than base_delay_ms",
            ));
        }
        Ok(())
    }
}
