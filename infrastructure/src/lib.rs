//! Infrastructure layer for toolguard
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer:
//!
//! - [`remote`]: HTTP/JSON-RPC client with pooling, caching and retries
//! - [`fallback`]: SQLite executor for the locally served tools
//! - [`config`]: configuration file loading

pub mod config;
pub mod fallback;
pub mod remote;

// Re-export commonly used types
pub use config::{ConfigLoader, ConfigValidationError, FileConfig};
pub use fallback::{FallbackSettings, SqliteFallbackExecutor};
pub use remote::{
    ConnectionState, RemoteError, RemoteSettings, ResilientClient,
    error::Result,
};
