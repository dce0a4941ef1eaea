//! Health of remote targets as seen by periodic probes.

pub mod server;
