//! Batch configuration from TOML (`[batch]` section)

use serde::{Deserialize, Serialize};
use toolguard_application::BatchParams;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileBatchConfig {
    /// Calls in flight at once in parallel mode
    pub max_concurrent: usize,
}

impl Default for FileBatchConfig {
    fn default() -> Self {
        Self { max_concurrent: 5 }
    }
}

impl FileBatchConfig {
    pub fn to_params(&self) -> BatchParams {
        BatchParams::default().with_max_concurrent(self.max_concurrent)
    }
}
