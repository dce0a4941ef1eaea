//! Domain layer for toolguard
//!
//! This crate holds the rules of resilient tool invocation. It has no
//! dependencies on networking, storage or runtime concerns.
//!
//! # Core Concepts
//!
//! - **Tool call**: a tool name plus a parameter set, with a canonical cache key
//! - **Execution mode**: where a call is routed (primary, fallback, degraded, recovery)
//! - **Circuit breaker**: per-tool failure gate
//! - **Error type / recovery plan**: ordered classification of failure text and
//!   the static plan for each class
//! - **Server health**: probe-driven status of a remote target

pub mod health;
pub mod orchestration;
pub mod resilience;
pub mod sales;
pub mod tool;

// Re-export commonly used types
pub use health::server::{HealthStatus, ServerHealth, StatusChange};
pub use orchestration::{
    mode::ExecutionMode,
    state::{MODE_HISTORY_LIMIT, ModeChange, ModeMetrics, ModeState, ModeStats},
};
pub use resilience::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus, CircuitState},
    error_type::{ErrorType, classify},
    recovery::{ErrorContext, RecoveryAction, RecoveryPlan, RecoveryPlans},
};
pub use sales::{MonthlyPoint, SeriesSummary};
pub use tool::{
    entities::{ToolCall, ToolDefinition, ToolParameter, ToolSpec},
    metrics::ToolMetrics,
    result::{ExecutionResult, SKIPPED_MESSAGE},
    validation::{ParamKind, ParameterValidator, ValidatedParams, ValidationError},
};
