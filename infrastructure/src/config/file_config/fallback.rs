//! Local fallback store configuration from TOML (`[fallback]` section)

use crate::fallback::FallbackSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw fallback configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileFallbackConfig {
    pub enabled: bool,
    /// sqlx connection string of the local store
    pub database_url: String,
    pub query_timeout_secs: u64,
    pub max_rows: usize,
}

impl Default for FileFallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_url: "sqlite://db.sqlite3".to_string(),
            query_timeout_secs: 8,
            max_rows: 500,
        }
    }
}

impl FileFallbackConfig {
    pub fn to_settings(&self) -> FallbackSettings {
        FallbackSettings {
            database_url: self.database_url.clone(),
            query_timeout: Duration::from_secs(self.query_timeout_secs),
            max_rows: self.max_rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_fallback_settings() {
        assert_eq!(FileFallbackConfig::default().to_settings(), FallbackSettings::default());
    }
}
