//! Application layer for toolguard
//!
//! This crate contains use cases, port definitions, and application configuration.
//! It depends only on the domain layer.

pub mod config;
pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use config::{BatchParams, MonitorParams, RecoveryStrategy};
pub use ports::{
    fallback::{DEFAULT_FALLBACK_REASON, FallbackError, FallbackPort, FallbackReason, FallbackStatus},
    remote_tools::{HealthProbe, ProbeReport, RemoteFailure, RemoteResponse, RemoteToolPort},
    tool_invoker::ToolInvoker,
};
pub use use_cases::execute_batch::{BatchExecutor, BatchStatistics};
pub use use_cases::execute_tool::{Orchestrator, OrchestratorBuilder, OrchestratorStatus};
pub use use_cases::listeners::{ListenerError, ListenerResult, Listeners};
pub use use_cases::monitor_health::{HealthMonitor, MonitorStatistics};
pub use use_cases::recover_error::{
    RecoveryEvent, RecoveryOutcome, RecoveryPlanner, RecoveryStatistics,
};
