//! Health monitor configuration from TOML (`[monitor]` section)

use serde::{Deserialize, Serialize};
use std::time::Duration;
use toolguard_application::MonitorParams;

/// Raw health monitor configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileMonitorConfig {
    /// Run the periodic probe loop
    pub enabled: bool,
    pub check_interval_secs: u64,
    pub failure_threshold: u32,
}

impl Default for FileMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: 30,
            failure_threshold: 3,
        }
    }
}

impl FileMonitorConfig {
    pub fn to_params(&self) -> MonitorParams {
        MonitorParams::default()
            .with_check_interval(Duration::from_secs(self.check_interval_secs))
            .with_failure_threshold(self.failure_threshold)
    }
}
