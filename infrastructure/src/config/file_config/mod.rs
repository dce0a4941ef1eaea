//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! Each section converts into the settings type of the layer that uses it.

mod batch;
mod fallback;
mod monitor;
mod recovery;
mod remote;

pub use batch::FileBatchConfig;
pub use fallback::FileFallbackConfig;
pub use monitor::FileMonitorConfig;
pub use recovery::FileRecoveryConfig;
pub use remote::FileRemoteConfig;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigValidationError {
    #[error("remote.base_url cannot be empty")]
    EmptyBaseUrl,

    #[error("{0} must be at least 1")]
    ZeroValue(&'static str),

    #[error("recovery.backoff_factor must be >= 1.0 (got {0})")]
    InvalidBackoffFactor(f64),

    #[error("{0} must be a non-negative number of seconds")]
    NegativeDuration(&'static str),
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Remote tool service
    pub remote: FileRemoteConfig,
    /// Orchestrator retry and recovery strategy
    pub recovery: FileRecoveryConfig,
    /// Health monitor
    pub monitor: FileMonitorConfig,
    /// Local fallback store
    pub fallback: FileFallbackConfig,
    /// Batch execution
    pub batch: FileBatchConfig,
}

impl FileConfig {
    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.remote.base_url.trim().is_empty() {
            return Err(ConfigValidationError::EmptyBaseUrl);
        }
        for (name, value) in [
            ("remote.max_retries", self.remote.max_retries as u64),
            ("remote.pool_size", self.remote.pool_size as u64),
            ("recovery.max_retries", self.recovery.max_retries as u64),
            ("recovery.error_threshold", self.recovery.error_threshold as u64),
            ("monitor.check_interval_secs", self.monitor.check_interval_secs),
            ("monitor.failure_threshold", self.monitor.failure_threshold as u64),
            ("batch.max_concurrent", self.batch.max_concurrent as u64),
        ] {
            if value == 0 {
                return Err(ConfigValidationError::ZeroValue(name));
            }
        }
        for (name, secs) in [
            ("remote.retry_delay_secs", self.remote.retry_delay_secs),
            ("recovery.initial_delay_secs", self.recovery.initial_delay_secs),
        ] {
            if !(secs.is_finite() && secs >= 0.0) {
                return Err(ConfigValidationError::NegativeDuration(name));
            }
        }
        if !(self.recovery.backoff_factor >= 1.0) {
            return Err(ConfigValidationError::InvalidBackoffFactor(
                self.recovery.backoff_factor,
            ));
        }
        Ok(())
    }
}
