//! Remote tool service adapter (HTTP + JSON-RPC)

pub mod cache;
pub mod client;
pub mod error;
pub mod pool;
pub mod protocol;

pub use cache::ToolCache;
pub use client::{ConnectionState, RemoteSettings, ResilientClient};
pub use error::RemoteError;
pub use pool::ConnectionPool;
pub use protocol::{describe_tool, parse_manifest};
