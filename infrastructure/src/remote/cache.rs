//! Time-bounded result cache keyed by canonical tool call

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    stored_at: Instant,
}

/// Shared, read-mostly cache of successful payloads.
///
/// Expired entries are treated as absent on read and removed either lazily
/// or by the periodic sweep.
#[derive(Debug)]
pub struct ToolCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ToolCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if now.duration_since(entry.stored_at) < self.ttl => {
                    return Some(entry.payload.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: evict unless a writer refreshed it in between
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key) {
            if now.duration_since(entry.stored_at) < self.ttl {
                return Some(entry.payload.clone());
            }
            entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: impl Into<String>, payload: Value) {
        self.entries.write().insert(
            key.into(),
            CacheEntry {
                payload,
                stored_at: Instant::now(),
            },
        );
    }

    /// Remove expired entries, returning how many were dropped
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.stored_at) < ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Sweep every `period` until `cancel` fires
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            debug!(removed, "Swept expired cache entries");
                        }
                    }
                }
            }
        })
    }
}
