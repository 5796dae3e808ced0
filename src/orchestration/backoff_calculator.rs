//! # Backoff Calculator
//!
//! Delay calculation for rescheduled tasks.
//!
//! ## Overview
//!
//! Honors provider-requested delays (`retry_after`) when present, otherwise
//! grows the delay exponentially from a base, capped at a maximum and
//! optionally jittered to avoid synchronized retries against a provider API.

use crate::config::BackoffConfig;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    config: BackoffConfig,
}

impl Default for BackoffCalculator {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl BackoffCalculator {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.config.max_delay_ms)
    }

    /// Delay before the next attempt. `attempt` is 1-based; a provider
    /// requested delay wins over the exponential schedule but is still capped.
    pub fn calculate(&self, attempt: u32, requested: Option<Duration>) -> Duration {
        if let Some(requested) = requested {
            return requested.min(self.max_delay());
        }

        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let base = self.config.base_delay_ms as f64 * self.config.multiplier.powi(exponent);
        let max = self.config.max_delay_ms as f64;
        let mut delay = base.min(max);

        if self.config.jitter_enabled && self.config.max_jitter > 0.0 {
            // Symmetric jitter in [-max_jitter, +max_jitter]
            let jitter = delay * self.config.max_jitter * (fastrand::f64() * 2.0 - 1.0);
            delay = (delay + jitter).clamp(0.0, max);
        }

        Duration::from_millis(delay.round() as u64)
    }
}
