//! Local fallback port
//!
//! Defines the interface for executing a fixed subset of tools directly
//! against a local data store when the remote service is unavailable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use toolguard_domain::{ToolCall, ValidationError};

/// Errors that can occur on the fallback path
#[derive(Error, Debug)]
pub enum FallbackError {
    #[error("No fallback implementation for tool '{0}'")]
    UnsupportedTool(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Local query timed out after {0:?}")]
    QueryTimeout(Duration),

    #[error("Rejected non read-only query: {0}")]
    ReadOnlyViolation(String),
}

/// Reason reported in fallback payloads when none was recorded
pub const DEFAULT_FALLBACK_REASON: &str = "Primary path unavailable";

/// Why the fallback path was enabled
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackReason {
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackStatus {
    pub enabled: bool,
    pub reasons: Vec<FallbackReason>,
    pub supported_tools: Vec<String>,
    /// Description of the backing store (e.g. its connection string)
    pub store: String,
    pub store_available: bool,
}

/// Port for local tool execution
#[async_trait]
pub trait FallbackPort: Send + Sync {
    /// Pure membership check
    fn supports(&self, tool_name: &str) -> bool;

    fn supported_tools(&self) -> Vec<String>;

    /// Execute the tool locally. The payload has the same shape as the
    /// remote path (`status`, `results`, `row_count`) plus a fallback marker.
    async fn execute_fallback(&self, call: &ToolCall) -> Result<Value, FallbackError>;

    /// Record why the fallback path is in use
    fn enable_fallback(&self, reason: &str);

    fn disable_fallback(&self);

    fn fallback_status(&self) -> FallbackStatus;
}
