//! Tool domain: calls, results, metrics and parameter validation.
//!
//! - [`entities::ToolCall`]: name + canonical parameter set
//! - [`result::ExecutionResult`]: uniform outcome of a top-level call
//! - [`metrics::ToolMetrics`]: per-tool counters
//! - [`validation::ParameterValidator`]: declarative per-tool schemas

pub mod entities;
pub mod metrics;
pub mod result;
pub mod validation;
