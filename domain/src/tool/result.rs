//! Uniform outcome of a top-level tool call

use crate::orchestration::mode::ExecutionMode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Error text placed in batch slots that were never executed.
pub const SKIPPED_MESSAGE: &str = "Skipped due to previous error";

/// Result of one top-level tool call.
///
/// Always fully populated: callers receive `success`, `mode`, `retries` and
/// either a `payload` or an `error`, never a partial value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub mode: ExecutionMode,
    /// Wall time spent on the call, in milliseconds
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retries: u32,
}

impl ExecutionResult {
    pub fn success(payload: Value, mode: ExecutionMode, elapsed: Duration) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            mode,
            elapsed_ms: elapsed.as_millis() as u64,
            error: None,
            retries: 0,
        }
    }

    pub fn failure(error: impl Into<String>, mode: ExecutionMode, elapsed: Duration) -> Self {
        Self {
            success: false,
            payload: None,
            mode,
            elapsed_ms: elapsed.as_millis() as u64,
            error: Some(error.into()),
            retries: 0,
        }
    }

    /// Placeholder for a batch slot that was not executed
    pub fn skipped() -> Self {
        Self::failure(SKIPPED_MESSAGE, ExecutionMode::Degraded, Duration::ZERO)
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = elapsed.as_millis() as u64;
        self
    }

    pub fn is_skipped(&self) -> bool {
        !self.success && self.error.as_deref() == Some(SKIPPED_MESSAGE)
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}
