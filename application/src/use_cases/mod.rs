//! Use cases
//!
//! Application-level operations that orchestrate domain logic.

pub mod execute_batch;
pub mod execute_tool;
pub mod listeners;
pub mod monitor_health;
pub mod recover_error;
