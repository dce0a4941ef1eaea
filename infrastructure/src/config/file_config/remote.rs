//! Remote service configuration from TOML (`[remote]` section)

use crate::remote::RemoteSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw remote service configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRemoteConfig {
    /// Target name used in health reports and mode reasons
    pub name: String,
    pub base_url: String,
    pub manifest_path: String,
    pub invoke_path: String,
    /// Attempts per call
    pub max_retries: u32,
    /// Linear backoff unit between attempts
    pub retry_delay_secs: f64,
    /// Per-request timeout
    pub timeout_secs: u64,
    pub pool_size: usize,
    /// Idle connections kept per host
    pub keepalive: usize,
    pub cache_ttl_secs: u64,
    pub cache_sweep_secs: u64,
}

impl Default for FileRemoteConfig {
    fn default() -> Self {
        Self {
            name: "primary".to_string(),
            base_url: "http://localhost:8000".to_string(),
            manifest_path: "/api/toolset".to_string(),
            invoke_path: "/mcp".to_string(),
            max_retries: 3,
            retry_delay_secs: 1.0,
            timeout_secs: 30,
            pool_size: 10,
            keepalive: 5,
            cache_ttl_secs: 300,
            cache_sweep_secs: 60,
        }
    }
}

impl FileRemoteConfig {
    pub fn to_settings(&self) -> RemoteSettings {
        RemoteSettings {
            name: self.name.clone(),
            base_url: self.base_url.clone(),
            manifest_path: self.manifest_path.clone(),
            invoke_path: self.invoke_path.clone(),
            max_retries: self.max_retries,
            retry_delay: Duration::from_secs_f64(self.retry_delay_secs.max(0.0)),
            timeout: Duration::from_secs(self.timeout_secs),
            pool_size: self.pool_size,
            keepalive: self.keepalive,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            cache_sweep_interval: Duration::from_secs(self.cache_sweep_secs.max(1)),
        }
    }
}
