//! Orchestration: execution modes and the mode state machine.
//!
//! - [`mode::ExecutionMode`]: PRIMARY / FALLBACK / DEGRADED / RECOVERY
//! - [`state::ModeState`]: transition rules and bounded change history
//! - [`state::ModeMetrics`]: per-mode execution counters

pub mod mode;
pub mod state;
