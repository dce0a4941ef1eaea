//! Remote tool service port
//!
//! Defines how the application layer talks to the remote tool service and
//! how targets are probed for liveness.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use toolguard_domain::{ErrorType, ToolCall, ToolDefinition, ToolMetrics, classify};

/// Successful remote invocation
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    /// Flattened result payload
    pub payload: Value,
    /// Attempts beyond the first that the client needed
    pub retries: u32,
    /// Served from the result cache without a network call
    pub cached: bool,
}

impl RemoteResponse {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            retries: 0,
            cached: false,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn cached(mut self) -> Self {
        self.cached = true;
        self
    }
}

/// Structured failure of a remote call, after the client's own retries
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct RemoteFailure {
    pub message: String,
    pub error_type: ErrorType,
    /// HTTP status, when the service answered
    pub status: Option<u16>,
    pub retries: u32,
}

impl RemoteFailure {
    /// Failure classified from its message
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            error_type: classify(&message),
            message,
            status: None,
            retries: 0,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// Outcome of a successful liveness probe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeReport {
    pub tool_count: usize,
    pub response_time: Duration,
}

/// A target the health monitor can probe
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Stable name of the target (e.g. "primary")
    fn target_name(&self) -> &str;

    fn target_url(&self) -> &str;

    /// Lightweight liveness check
    async fn probe(&self) -> Result<ProbeReport, RemoteFailure>;
}

/// Port for the remote tool service
///
/// Implementations own connection pooling, retries, caching and per-tool
/// metrics. Failures are returned as values, never panics.
#[async_trait]
pub trait RemoteToolPort: Send + Sync {
    fn target_name(&self) -> &str;

    /// Prepare the client and load the tool manifest. Returns false when the
    /// manifest could not be loaded; the client remains usable.
    async fn initialize(&self) -> bool;

    /// Fetch the tool manifest
    async fn load_tools(&self) -> bool;

    /// Tools from the last loaded manifest
    fn available_tools(&self) -> Vec<ToolDefinition>;

    /// Invoke one tool, consulting the cache first when `use_cache` is set
    async fn invoke_tool(&self, call: &ToolCall, use_cache: bool) -> Result<RemoteResponse, RemoteFailure>;

    /// Liveness probe of the remote service
    async fn probe(&self) -> Result<ProbeReport, RemoteFailure>;

    /// Snapshot of per-tool metrics
    fn tool_metrics(&self) -> Vec<ToolMetrics>;

    /// Release pooled connections and background tasks
    async fn shutdown(&self);
}
