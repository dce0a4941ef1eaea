//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters must implement.

pub mod fallback;
pub mod remote_tools;
pub mod tool_invoker;
