//! Application-level configuration.
//!
//! - [`RecoveryStrategy`]: orchestrator retry, backoff and recovery window
//! - [`MonitorParams`]: health probe interval and failure threshold
//! - [`BatchParams`]: batch concurrency bound

pub mod resilience_params;

pub use resilience_params::{BatchParams, MonitorParams, RecoveryStrategy};
