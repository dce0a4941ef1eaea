//! Local fallback store adapter

pub mod sql_guard;
pub mod sqlite;

pub use sqlite::{FALLBACK_TOOLS, FallbackSettings, SqliteFallbackExecutor};
