//! Batch executor use case.
//!
//! Runs a list of calls through a [`ToolInvoker`], either sequentially or with
//! bounded concurrency. The output always has one result per input call, in
//! input order. With `stop_on_error`, every position after the first failure
//! holds a skipped result.

use crate::config::BatchParams;
use crate::ports::tool_invoker::ToolInvoker;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use toolguard_domain::{ExecutionResult, ToolCall};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct BatchCounters {
    batches: u64,
    calls: u64,
    failures: u64,
    total_time: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchStatistics {
    pub total_batches: u64,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_time_secs: f64,
    pub average_batch_time_secs: f64,
    /// Percentage of calls that succeeded
    pub success_rate: f64,
}

pub struct BatchExecutor {
    invoker: Arc<dyn ToolInvoker>,
    params: BatchParams,
    counters: Mutex<BatchCounters>,
}

impl BatchExecutor {
    pub fn new(invoker: Arc<dyn ToolInvoker>, params: BatchParams) -> Self {
        Self {
            invoker,
            params,
            counters: Mutex::new(BatchCounters::default()),
        }
    }

    pub async fn execute_batch(
        &self,
        calls: &[ToolCall],
        parallel: bool,
        stop_on_error: bool,
    ) -> Vec<ExecutionResult> {
        let started = Instant::now();
        let results = if parallel {
            self.execute_parallel(calls, stop_on_error).await
        } else {
            self.execute_sequential(calls, stop_on_error).await
        };
        let elapsed = started.elapsed();

        let failures = results.iter().filter(|r| !r.success).count() as u64;
        {
            let mut counters = self.counters.lock();
            counters.batches += 1;
            counters.calls += calls.len() as u64;
            counters.failures += failures;
            counters.total_time += elapsed;
        }
        info!(
            calls = calls.len(),
            failures = failures,
            parallel = parallel,
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch executed"
        );
        results
    }

    async fn execute_parallel(&self, calls: &[ToolCall], stop_on_error: bool) -> Vec<ExecutionResult> {
        let stopped = AtomicBool::new(false);
        let stopped = &stopped;
        let invoker = &self.invoker;

        let mut results: Vec<ExecutionResult> = stream::iter(calls)
            .map(move |call| async move {
                if stop_on_error && stopped.load(Ordering::SeqCst) {
                    return ExecutionResult::skipped();
                }
                let result = invoker.invoke(call).await;
                if stop_on_error && !result.success {
                    stopped.store(true, Ordering::SeqCst);
                }
                result
            })
            .buffered(self.params.max_concurrent.max(1))
            .collect()
            .await;

        if stop_on_error
            && let Some(first) = results.iter().position(|r| !r.success && !r.is_skipped())
        {
            debug!(position = first, "Parallel batch stopped after failure");
            for slot in results.iter_mut().skip(first + 1) {
                *slot = ExecutionResult::skipped();
            }
        }
        results
    }

    async fn execute_sequential(&self, calls: &[ToolCall], stop_on_error: bool) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self.invoker.invoke(call).await;
            let failed = !result.success;
            results.push(result);
            if stop_on_error && failed {
                debug!(tool = %call.tool_name, "Sequential batch stopped after failure");
                break;
            }
        }
        results.resize_with(calls.len(), ExecutionResult::skipped);
        results
    }

    pub fn statistics(&self) -> BatchStatistics {
        let counters = self.counters.lock();
        let average = if counters.batches > 0 {
            counters.total_time.as_secs_f64() / counters.batches as f64
        } else {
            0.0
        };
        let success_rate = if counters.calls > 0 {
            (counters.calls - counters.failures) as f64 / counters.calls as f64 * 100.0
        } else {
            0.0
        };
        BatchStatistics {
            total_batches: counters.batches,
            total_calls: counters.calls,
            total_failures: counters.failures,
            total_time_secs: counters.total_time.as_secs_f64(),
            average_batch_time_secs: average,
            success_rate,
        }
    }

    pub fn reset_statistics(&self) {
        *self.counters.lock() = BatchCounters::default();
    }
}
