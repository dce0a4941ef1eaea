//! Resilience parameters: orchestrator, monitor and batch tuning.
//!
//! These are application-layer knobs, filled from the config file by the
//! infrastructure layer and handed to the use cases.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Orchestrator retry and recovery behaviour.
///
/// | Field | Default |
/// |-------|---------|
/// | `max_retries` | 3 |
/// | `initial_delay` | 1s |
/// | `max_delay` | 60s |
/// | `backoff_factor` | 2.0 |
/// | `recovery_window` | 5 min |
/// | `error_threshold` | 3 |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStrategy {
    /// Attempts on the primary path per call
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Minimum time between automatic recovery attempts
    pub recovery_window: Duration,
    /// Consecutive primary errors before failing over
    pub error_threshold: u32,
}

impl Default for RecoveryStrategy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            recovery_window: Duration::from_secs(5 * 60),
            error_threshold: 3,
        }
    }
}

impl RecoveryStrategy {
    // ==================== Builder Methods ====================

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_recovery_window(mut self, window: Duration) -> Self {
        self.recovery_window = window;
        self
    }

    pub fn with_error_threshold(mut self, threshold: u32) -> Self {
        self.error_threshold = threshold;
        self
    }

    /// `initial_delay × backoff_factor^attempt`, capped at `max_delay`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.powi(attempt as i32);
        let secs = (self.initial_delay.as_secs_f64() * factor).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Health monitor tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorParams {
    pub check_interval: Duration,
    /// Consecutive probe failures before a target is UNHEALTHY
    pub failure_threshold: u32,
}

impl Default for MonitorParams {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            failure_threshold: 3,
        }
    }
}

impl MonitorParams {
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }
}

/// Batch executor tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchParams {
    /// Calls in flight at once in parallel mode
    pub max_concurrent: usize,
}

impl Default for BatchParams {
    fn default() -> Self {
        Self { max_concurrent: 5 }
    }
}

impl BatchParams {
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let strategy = RecoveryStrategy::default().with_max_delay(Duration::from_secs(5));
        assert_eq!(strategy.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(strategy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(strategy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(strategy.backoff_delay(3), Duration::from_secs(5));
        assert_eq!(strategy.backoff_delay(30), Duration::from_secs(5));
    }

    #[test]
    fn test_defaults() {
        let strategy = RecoveryStrategy::default();
        assert_eq!(strategy.max_retries, 3);
        assert_eq!(strategy.error_threshold, 3);
        assert_eq!(strategy.recovery_window, Duration::from_secs(300));
        assert_eq!(MonitorParams::default().check_interval, Duration::from_secs(30));
        assert_eq!(BatchParams::default().max_concurrent, 5);
    }
}
