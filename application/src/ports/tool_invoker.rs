//! Tool invoker port
//!
//! Anything that turns a [`ToolCall`] into a uniform [`ExecutionResult`].
//! The orchestrator implements it; the batch executor consumes it.

use async_trait::async_trait;
use toolguard_domain::{ExecutionResult, ToolCall};

#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Execute one call. Never fails: errors are reported in the result.
    async fn invoke(&self, call: &ToolCall) -> ExecutionResult;
}
