//! Ordered listener lists with per-listener isolation.
//!
//! Listeners run in registration order. A listener that returns an error or
//! panics is logged and skipped; the remaining listeners still run.

use parking_lot::RwLock;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::warn;

pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;
pub type ListenerResult = Result<(), ListenerError>;

type Listener<E> = Arc<dyn Fn(&E) -> ListenerResult + Send + Sync>;

pub struct Listeners<E> {
    entries: RwLock<Vec<(String, Listener<E>)>>,
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<E> Listeners<E> {
    pub fn register<F>(&self, name: impl Into<String>, listener: F)
    where
        F: Fn(&E) -> ListenerResult + Send + Sync + 'static,
    {
        self.entries.write().push((name.into(), Arc::new(listener)));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Invoke every listener in order; returns how many failed
    pub fn notify(&self, event: &E) -> usize {
        // snapshot so listeners may register further listeners
        let entries: Vec<(String, Listener<E>)> = self.entries.read().clone();
        let mut failures = 0;
        for (name, listener) in entries {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!(listener = %name, error = %e, "Listener failed");
                }
                Err(_) => {
                    failures += 1;
                    warn!(listener = %name, "Listener panicked");
                }
            }
        }
        failures
    }
}
