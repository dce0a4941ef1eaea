//! Fixed-size pool of HTTP clients handed out round-robin

use super::error::{RemoteError, Result};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Pool of reusable `reqwest` clients.
///
/// Every client shares the same request timeout and idle keep-alive limit.
/// [`acquire`](Self::acquire) never waits: it hands out the next client in
/// turn.
#[derive(Debug)]
pub struct ConnectionPool {
    clients: RwLock<Vec<reqwest::Client>>,
    next: AtomicUsize,
}

impl ConnectionPool {
    /// Build `size` clients. Fails when a client cannot be constructed or
    /// the pool would be empty.
    pub fn new(size: usize, timeout: Duration, keepalive: usize) -> Result<Self> {
        if size == 0 {
            return Err(RemoteError::PoolInit("pool size must be at least 1".into()));
        }

        let clients = (0..size)
            .map(|_| {
                reqwest::Client::builder()
                    .timeout(timeout)
                    .pool_max_idle_per_host(keepalive)
                    .build()
                    .map_err(|e| RemoteError::PoolInit(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(size, ?timeout, keepalive, "Connection pool ready");
        Ok(Self {
            clients: RwLock::new(clients),
            next: AtomicUsize::new(0),
        })
    }

    /// Next client in round-robin order, with its slot index
    pub fn acquire_slot(&self) -> Result<(usize, reqwest::Client)> {
        let clients = self.clients.read();
        if clients.is_empty() {
            return Err(RemoteError::PoolClosed);
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % clients.len();
        Ok((index, clients[index].clone()))
    }

    pub fn acquire(&self) -> Result<reqwest::Client> {
        self.acquire_slot().map(|(_, client)| client)
    }

    pub fn size(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_closed(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Drop every client. Safe to call more than once.
    pub fn shutdown(&self) {
        let mut clients = self.clients.write();
        if clients.is_empty() {
            return;
        }
        debug!(count = clients.len(), "Closing pooled clients");
        clients.clear();
    }
}
