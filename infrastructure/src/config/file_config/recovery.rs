//! Orchestrator strategy from TOML (`[recovery]` section)

use serde::{Deserialize, Serialize};
use std::time::Duration;
use toolguard_application::RecoveryStrategy;

/// Raw recovery strategy from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRecoveryConfig {
    pub max_retries: u32,
    pub initial_delay_secs: f64,
    pub max_delay_secs: u64,
    pub backoff_factor: f64,
    /// Minimum time between automatic recovery attempts
    pub recovery_window_secs: u64,
    /// Consecutive primary errors before failing over
    pub error_threshold: u32,
}

impl Default for FileRecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_secs: 1.0,
            max_delay_secs: 60,
            backoff_factor: 2.0,
            recovery_window_secs: 300,
            error_threshold: 3,
        }
    }
}

impl FileRecoveryConfig {
    pub fn to_strategy(&self) -> RecoveryStrategy {
        RecoveryStrategy::default()
            .with_max_retries(self.max_retries)
            .with_initial_delay(Duration::from_secs_f64(self.initial_delay_secs.max(0.0)))
            .with_max_delay(Duration::from_secs(self.max_delay_secs))
            .with_backoff_factor(self.backoff_factor)
            .with_recovery_window(Duration::from_secs(self.recovery_window_secs))
            .with_error_threshold(self.error_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_strategy() {
        assert_eq!(FileRecoveryConfig::default().to_strategy(), RecoveryStrategy::default());
    }
}
