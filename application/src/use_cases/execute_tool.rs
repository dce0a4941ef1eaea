//! Orchestrator use case: resilient execution of a single tool call.
//!
//! The orchestrator owns the process-wide [`ModeState`] and routes every
//! call according to it:
//!
//! ```text
//!                 3 errors / monitor UNHEALTHY
//!   ┌─────────┐ ────────────────────────────► ┌──────────────────────┐
//!   │ PRIMARY │                               │ FALLBACK / DEGRADED  │
//!   └─────────┘ ◄──┐                          └──────────────────────┘
//!                  │ probe ok                    │ fallback success after the
//!                  │                             │ recovery window, or monitor
//!             ┌──────────┐   probe failed        │ HEALTHY
//!             │ RECOVERY │ ─────────────────────►│ (back to previous)
//!             └──────────┘ ◄─────────────────────┘
//! ```
//!
//! # Flow
//!
//! 1. Validate parameters (validation failures are never retried)
//! 2. In PRIMARY/RECOVERY: check the tool's circuit breaker, then call the
//!    remote service with exponential backoff, bounded per error type
//! 3. On primary failure: count it toward failover, then hand the error to the
//!    [`RecoveryPlanner`] with a retry and (when supported) a fallback step.
//!    If the plan gives up without reaching the fallback, the call still
//!    fails over; only VALIDATION failures are returned as they are
//! 4. In FALLBACK/DEGRADED: go straight to the local fallback when it
//!    supports the tool
//!
//! Every path ends in exactly one [`ExecutionResult`].
//!
//! Mode changes are applied under a short synchronous lock that is never held
//! across an await, so transitions are serialized without blocking calls.

use super::monitor_health::{HealthMonitor, MonitorStatistics};
use super::recover_error::{RecoveryFn, RecoveryOutcome, RecoveryPlanner, RecoveryStatistics};
use crate::config::RecoveryStrategy;
use crate::ports::fallback::{FallbackPort, FallbackStatus};
use crate::ports::remote_tools::{RemoteFailure, RemoteResponse, RemoteToolPort};
use crate::ports::tool_invoker::ToolInvoker;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use toolguard_domain::{
    CircuitBreakerStatus, ErrorContext, ErrorType, ExecutionMode, ExecutionResult, ModeChange,
    ModeMetrics, ModeState, ParameterValidator, RecoveryAction, ToolCall, ToolMetrics,
};
use tracing::{debug, error, info, warn};

/// Number of mode changes reported by [`Orchestrator::get_status`]
const RECENT_MODE_CHANGES: usize = 10;

fn now_std() -> std::time::Instant {
    Instant::now().into_std()
}

/// Per-mode counters as reported in [`OrchestratorStatus`]
#[derive(Debug, Clone, Serialize)]
pub struct ModeMetricsView {
    pub executions: u64,
    pub successes: u64,
    pub total_time_secs: f64,
    pub success_rate: f64,
    pub average_time_secs: f64,
}

/// Snapshot returned by [`Orchestrator::get_status`]
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub mode: ExecutionMode,
    pub consecutive_errors: u32,
    pub recovery_attempts: u64,
    pub last_recovery_attempt: Option<DateTime<Utc>>,
    pub mode_metrics: BTreeMap<String, ModeMetricsView>,
    pub tool_metrics: Vec<ToolMetrics>,
    pub circuit_breakers: BTreeMap<String, CircuitBreakerStatus>,
    pub recovery: RecoveryStatistics,
    pub recent_mode_changes: Vec<ModeChange>,
    pub monitor: Option<MonitorStatistics>,
    pub fallback: Option<FallbackStatus>,
}

struct Inner {
    me: Weak<Inner>,
    remote: Arc<dyn RemoteToolPort>,
    fallback: Option<Arc<dyn FallbackPort>>,
    monitor: Option<Arc<HealthMonitor>>,
    planner: RecoveryPlanner,
    validator: ParameterValidator,
    strategy: RecoveryStrategy,
    state: Mutex<ModeState>,
    metrics: Mutex<ModeMetrics>,
    /// Held for the duration of one recovery attempt
    recovery_gate: tokio::sync::Mutex<()>,
    recovery_task: Mutex<Option<JoinHandle<()>>>,
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    remote: Arc<dyn RemoteToolPort>,
    fallback: Option<Arc<dyn FallbackPort>>,
    monitor: Option<Arc<HealthMonitor>>,
    planner: Option<RecoveryPlanner>,
    validator: Option<ParameterValidator>,
    strategy: RecoveryStrategy,
}

impl OrchestratorBuilder {
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackPort>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Attach a health monitor; its failure and recovery events for the
    /// remote target drive failover and recovery
    pub fn with_monitor(mut self, monitor: Arc<HealthMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_planner(mut self, planner: RecoveryPlanner) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn with_validator(mut self, validator: ParameterValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_strategy(mut self, strategy: RecoveryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn build(self) -> Orchestrator {
        let inner = Arc::new_cyclic(|me| Inner {
            me: me.clone(),
            state: Mutex::new(ModeState::new(
                self.strategy.error_threshold,
                self.fallback.is_some(),
            )),
            remote: self.remote,
            fallback: self.fallback,
            monitor: self.monitor,
            planner: self.planner.unwrap_or_default(),
            validator: self.validator.unwrap_or_default(),
            strategy: self.strategy,
            metrics: Mutex::new(ModeMetrics::default()),
            recovery_gate: tokio::sync::Mutex::new(()),
            recovery_task: Mutex::new(None),
        });

        if let Some(monitor) = &inner.monitor {
            register_monitor_listeners(monitor, &inner);
        }

        Orchestrator { inner }
    }
}

fn register_monitor_listeners(monitor: &HealthMonitor, inner: &Arc<Inner>) {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    monitor.on_failure("orchestrator", move |change| {
        if let Some(inner) = weak.upgrade()
            && change.target == inner.remote.target_name()
        {
            let transition = inner.state.lock().primary_unhealthy();
            inner.apply_change(transition);
        }
        Ok(())
    });

    let weak: Weak<Inner> = Arc::downgrade(inner);
    monitor.on_recovery("orchestrator", move |change| {
        if let Some(inner) = weak.upgrade()
            && change.target == inner.remote.target_name()
            && inner.mode().is_failover()
        {
            inner.schedule_recovery("primary target healthy again");
        }
        Ok(())
    });
}

/// Top-level entry point: routes each call to the remote service or the
/// local fallback and maintains the execution mode.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn builder(remote: Arc<dyn RemoteToolPort>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            remote,
            fallback: None,
            monitor: None,
            planner: None,
            validator: None,
            strategy: RecoveryStrategy::default(),
        }
    }

    /// Initialize the remote client, pick the initial mode from a probe and
    /// start the monitor. Returns false only when neither path is usable.
    pub async fn initialize(&self) -> bool {
        let inner = &self.inner;
        let loaded = inner.remote.initialize().await;
        let reachable = loaded && inner.remote.probe().await.is_ok();

        let change = inner.state.lock().start(reachable);
        inner.apply_change(change);

        if let Some(monitor) = &inner.monitor {
            monitor.start();
        }

        let mode = inner.mode();
        match mode {
            ExecutionMode::Primary => info!(mode = %mode, "Orchestrator initialized"),
            ExecutionMode::Fallback => warn!(mode = %mode, "Orchestrator initialized without primary"),
            _ => error!(mode = %mode, "Orchestrator initialized without any execution path"),
        }
        reachable || inner.fallback.is_some()
    }

    pub fn mode(&self) -> ExecutionMode {
        self.inner.mode()
    }

    /// Execute one tool call. Never fails; every outcome is an [`ExecutionResult`].
    pub async fn execute_tool(&self, call: &ToolCall) -> ExecutionResult {
        let inner = &self.inner;
        let started = Instant::now();

        let call = match inner.validator.validate(&call.tool_name, &call.parameters) {
            Ok(validated) => {
                for warning in &validated.warnings {
                    debug!(tool = %call.tool_name, "{}", warning);
                }
                ToolCall::new(&call.tool_name).with_parameters(validated.params)
            }
            Err(e) => {
                let message = e.to_string();
                let context = ErrorContext::from_message(&message)
                    .with_error_type(ErrorType::Validation)
                    .with_tool(&call.tool_name)
                    .with_parameters(call.parameters.clone());
                inner.planner.handle::<Value>(context, None, None).await;
                let result = ExecutionResult::failure(message, inner.mode(), started.elapsed());
                return inner.finish(result);
            }
        };

        let mode = inner.mode();
        let result = if mode.uses_primary() {
            self.execute_primary(&call, started).await
        } else {
            inner
                .execute_failover(&call, &format!("mode is {}", mode), started)
                .await
        };
        inner.finish(result)
    }

    async fn execute_primary(&self, call: &ToolCall, started: Instant) -> ExecutionResult {
        let inner = &self.inner;
        let tool = call.tool_name.as_str();

        if !inner.planner.can_execute(tool, now_std()) {
            warn!(tool = tool, "Circuit breaker open, primary path skipped");
            let reason = format!("circuit breaker open for tool '{}'", tool);
            return inner.execute_failover(call, &reason, started).await;
        }

        let (failure, attempts) = match inner.attempt_primary(call).await {
            Ok((response, attempts)) => {
                inner.state.lock().record_primary_success();
                return ExecutionResult::success(
                    response.payload,
                    ExecutionMode::Primary,
                    started.elapsed(),
                )
                .with_retries(attempts - 1 + response.retries);
            }
            Err(failed) => failed,
        };
        let retries = attempts - 1 + failure.retries;

        let transition = inner.state.lock().record_primary_failure();
        inner.apply_change(transition);

        let context = ErrorContext::from_message(&failure.message)
            .with_error_type(failure.error_type)
            .with_tool(tool)
            .with_parameters(call.parameters.clone())
            .with_retry_count(attempts);

        let fallback_attempted = AtomicBool::new(false);
        let retry: RecoveryFn<'_, Value> = Box::new(move || {
            async move {
                if !inner.planner.can_execute(tool, now_std()) {
                    return Err(format!("circuit breaker open for tool '{}'", tool));
                }
                match inner.remote.invoke_tool(call, true).await {
                    Ok(response) => Ok(response.payload),
                    Err(failure) => {
                        inner.planner.record_failure(tool, now_std());
                        Err(failure.message)
                    }
                }
            }
            .boxed()
        });
        let fallback: Option<RecoveryFn<'_, Value>> = match &inner.fallback {
            Some(fallback) if fallback.supports(tool) => {
                let attempted = &fallback_attempted;
                Some(Box::new(move || {
                    attempted.store(true, Ordering::SeqCst);
                    async move { fallback.execute_fallback(call).await.map_err(|e| e.to_string()) }
                        .boxed()
                }))
            }
            _ => None,
        };

        match inner.planner.handle(context, Some(retry), fallback).await {
            RecoveryOutcome::Recovered {
                action: RecoveryAction::Fallback,
                value,
            } => {
                let result =
                    ExecutionResult::success(value, ExecutionMode::Fallback, started.elapsed())
                        .with_retries(retries);
                inner.after_fallback_success();
                result
            }
            RecoveryOutcome::Recovered { value, .. } => {
                inner.state.lock().record_primary_success();
                inner.planner.record_success(tool);
                ExecutionResult::success(value, ExecutionMode::Primary, started.elapsed())
                    .with_retries(retries + 1)
            }
            RecoveryOutcome::Failed { .. } if failure.error_type == ErrorType::Validation => {
                error!(tool = tool, error = %failure.message, "Tool call rejected by primary path");
                ExecutionResult::failure(failure.message, ExecutionMode::Primary, started.elapsed())
                    .with_retries(retries)
            }
            RecoveryOutcome::Failed { last_error } => {
                let detail = last_error.unwrap_or_else(|| failure.message.clone());
                if fallback_attempted.load(Ordering::SeqCst) {
                    error!(tool = tool, error = %detail, "All execution methods failed");
                    return ExecutionResult::failure(
                        format!("All execution methods failed: {}", detail),
                        ExecutionMode::Degraded,
                        started.elapsed(),
                    )
                    .with_retries(retries);
                }
                // the plan never reached its fallback step
                inner
                    .execute_failover(call, &detail, started)
                    .await
                    .with_retries(retries)
            }
        }
    }

    /// Attempt a recovery now: enter RECOVERY, probe the primary path and
    /// leave RECOVERY accordingly. Returns whether the mode is PRIMARY after.
    pub async fn attempt_recovery(&self) -> bool {
        self.inner.attempt_recovery("manual recovery").await
    }

    /// Operator override of the execution mode
    pub fn force_mode(&self, mode: ExecutionMode, reason: &str) {
        let change = self
            .inner
            .state
            .lock()
            .transition(mode, format!("forced: {}", reason));
        self.inner.apply_change(change);
    }

    pub fn planner(&self) -> &RecoveryPlanner {
        &self.inner.planner
    }

    pub fn remote(&self) -> &Arc<dyn RemoteToolPort> {
        &self.inner.remote
    }

    pub fn get_status(&self) -> OrchestratorStatus {
        let inner = &self.inner;
        let (mode, consecutive_errors, recovery_attempts, last_recovery_attempt, changes) = {
            let state = inner.state.lock();
            (
                state.mode(),
                state.consecutive_errors(),
                state.recovery_attempts(),
                state.last_recovery_attempt_at(),
                state.recent_changes(RECENT_MODE_CHANGES),
            )
        };
        let mode_metrics = inner
            .metrics
            .lock()
            .snapshot()
            .into_iter()
            .map(|(mode, stats)| {
                (
                    mode.to_string(),
                    ModeMetricsView {
                        executions: stats.executions,
                        successes: stats.successes,
                        total_time_secs: stats.total_time.as_secs_f64(),
                        success_rate: stats.success_rate(),
                        average_time_secs: stats.average_time().as_secs_f64(),
                    },
                )
            })
            .collect();
        let recovery = inner.planner.statistics();

        OrchestratorStatus {
            mode,
            consecutive_errors,
            recovery_attempts,
            last_recovery_attempt,
            mode_metrics,
            tool_metrics: inner.remote.tool_metrics(),
            circuit_breakers: recovery.circuit_breakers.clone(),
            recovery,
            recent_mode_changes: changes,
            monitor: inner.monitor.as_ref().map(|m| m.statistics()),
            fallback: inner.fallback.as_ref().map(|f| f.fallback_status()),
        }
    }

    /// Stop the monitor and any pending recovery, then release the remote client
    pub async fn shutdown(&self) {
        info!("Shutting down orchestrator");
        let inner = &self.inner;
        if let Some(monitor) = &inner.monitor {
            monitor.stop().await;
        }
        let pending = inner.recovery_task.lock().take();
        if let Some(task) = pending {
            task.abort();
        }
        inner.remote.shutdown().await;
        info!("Orchestrator shutdown complete");
    }
}

#[async_trait]
impl ToolInvoker for Orchestrator {
    async fn invoke(&self, call: &ToolCall) -> ExecutionResult {
        self.execute_tool(call).await
    }
}

impl Inner {
    fn mode(&self) -> ExecutionMode {
        self.state.lock().mode()
    }

    /// Remote calls with exponential backoff. Every attempt feeds the tool's
    /// breaker. Returns the response or the last failure, with the number of
    /// attempts made.
    async fn attempt_primary(
        &self,
        call: &ToolCall,
    ) -> Result<(RemoteResponse, u32), (RemoteFailure, u32)> {
        let tool = call.tool_name.as_str();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            debug!(tool = tool, attempt = attempt, "Invoking primary path");
            match self.remote.invoke_tool(call, true).await {
                Ok(response) => {
                    self.planner.record_success(tool);
                    return Ok((response, attempt));
                }
                Err(failure) => {
                    self.planner.record_failure(tool, now_std());
                    let budget = failure
                        .error_type
                        .primary_attempt_budget(self.strategy.max_retries);
                    if attempt >= budget {
                        return Err((failure, attempt));
                    }
                    let delay = self.strategy.backoff_delay(attempt - 1);
                    warn!(
                        tool = tool,
                        attempt = attempt,
                        error = %failure,
                        delay_ms = delay.as_millis() as u64,
                        "Primary call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Routing without the primary path: local fallback when it supports the
    /// tool, DEGRADED failure otherwise
    async fn execute_failover(
        &self,
        call: &ToolCall,
        primary_unavailable: &str,
        started: Instant,
    ) -> ExecutionResult {
        let Some(fallback) = self.fallback.as_ref().filter(|f| f.supports(&call.tool_name)) else {
            return ExecutionResult::failure(
                format!(
                    "All execution methods failed: primary path unavailable ({}), no fallback for tool '{}'",
                    primary_unavailable, call.tool_name
                ),
                ExecutionMode::Degraded,
                started.elapsed(),
            );
        };

        match fallback.execute_fallback(call).await {
            Ok(payload) => {
                let result =
                    ExecutionResult::success(payload, ExecutionMode::Fallback, started.elapsed());
                self.after_fallback_success();
                result
            }
            Err(e) => {
                error!(tool = %call.tool_name, error = %e, "Fallback execution failed");
                ExecutionResult::failure(
                    format!("All execution methods failed: {}", e),
                    ExecutionMode::Degraded,
                    started.elapsed(),
                )
            }
        }
    }

    fn after_fallback_success(&self) {
        let due = self
            .state
            .lock()
            .recovery_due(now_std(), self.strategy.recovery_window);
        if due {
            self.schedule_recovery("fallback succeeded after recovery window");
        }
    }

    fn finish(&self, result: ExecutionResult) -> ExecutionResult {
        self.metrics
            .lock()
            .record(result.mode, result.success, result.elapsed());
        result
    }

    /// Apply the side effects of a mode change
    fn apply_change(&self, change: Option<ModeChange>) {
        let Some(change) = change else {
            return;
        };
        info!(
            from = %change.from,
            to = %change.to,
            reason = %change.reason,
            "Execution mode changed"
        );
        if let Some(fallback) = &self.fallback {
            match change.to {
                ExecutionMode::Fallback => fallback.enable_fallback(&change.reason),
                ExecutionMode::Primary => fallback.disable_fallback(),
                _ => {}
            }
        }
    }

    /// Spawn a recovery attempt unless one is already pending
    fn schedule_recovery(&self, reason: &'static str) {
        let Some(inner) = self.me.upgrade() else {
            return;
        };
        let mut slot = self.recovery_task.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("Recovery already pending");
            return;
        }
        *slot = Some(tokio::spawn(async move {
            inner.attempt_recovery(reason).await;
        }));
    }

    async fn attempt_recovery(&self, reason: &str) -> bool {
        let Ok(_gate) = self.recovery_gate.try_lock() else {
            debug!("Recovery attempt already in progress");
            return false;
        };

        let change = self.state.lock().begin_recovery(now_std(), reason);
        let Some(change) = change else {
            return self.mode() == ExecutionMode::Primary;
        };
        let attempt = self.state.lock().recovery_attempts();
        info!(attempt = attempt, reason = reason, "Attempting recovery");
        self.apply_change(Some(change));

        let alive = match self.remote.probe().await {
            Ok(report) if report.tool_count > 0 => {
                debug!(tools = report.tool_count, "Primary probe succeeded");
                true
            }
            Ok(_) => {
                warn!("Primary probe succeeded but lists no tools");
                false
            }
            Err(e) => {
                warn!(error = %e, "Primary probe failed");
                false
            }
        };

        let change = self.state.lock().finish_recovery(alive);
        self.apply_change(change);
        if alive {
            info!("Recovery successful");
        } else {
            warn!("Recovery failed, reverting to previous mode");
        }
        self.mode() == ExecutionMode::Primary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorParams;
    use crate::ports::fallback::{FallbackError, FallbackReason};
    use crate::ports::remote_tools::{HealthProbe, ProbeReport};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, AtomicUsize};
    use std::time::Duration;
    use toolguard_domain::{CircuitBreakerConfig, CircuitState, ToolDefinition};

    // ==================== Mocks ====================

    struct MockRemote {
        healthy: AtomicBool,
        scripted_failures: Mutex<VecDeque<String>>,
        calls: AtomicU32,
        shutdowns: AtomicU32,
        tool_count: AtomicUsize,
    }

    impl MockRemote {
        fn new(healthy: bool) -> Arc<Self> {
            Arc::new(Self {
                healthy: AtomicBool::new(healthy),
                scripted_failures: Mutex::new(VecDeque::new()),
                calls: AtomicU32::new(0),
                shutdowns: AtomicU32::new(0),
                tool_count: AtomicUsize::new(3),
            })
        }

        fn fail_next(&self, messages: &[&str]) {
            self.scripted_failures
                .lock()
                .extend(messages.iter().map(|m| m.to_string()));
        }

        fn set_healthy(&self, healthy: bool) {
            self.healthy.store(healthy, Ordering::SeqCst);
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteToolPort for MockRemote {
        fn target_name(&self) -> &str {
            "primary"
        }

        async fn initialize(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }

        async fn load_tools(&self) -> bool {
            true
        }

        fn available_tools(&self) -> Vec<ToolDefinition> {
            Vec::new()
        }

        async fn invoke_tool(
            &self,
            call: &ToolCall,
            _use_cache: bool,
        ) -> Result<RemoteResponse, RemoteFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = self.scripted_failures.lock().pop_front() {
                return Err(RemoteFailure::new(message));
            }
            if self.healthy.load(Ordering::SeqCst) {
                Ok(RemoteResponse::new(
                    json!({"status": "success", "results": [call.tool_name.clone()]}),
                ))
            } else {
                Err(RemoteFailure::new("connection refused"))
            }
        }

        async fn probe(&self) -> Result<ProbeReport, RemoteFailure> {
            HealthProbe::probe(self).await
        }

        fn tool_metrics(&self) -> Vec<ToolMetrics> {
            Vec::new()
        }

        async fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl HealthProbe for MockRemote {
        fn target_name(&self) -> &str {
            "primary"
        }

        fn target_url(&self) -> &str {
            "http://mock"
        }

        async fn probe(&self) -> Result<ProbeReport, RemoteFailure> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(ProbeReport {
                    tool_count: self.tool_count.load(Ordering::SeqCst),
                    response_time: Duration::from_millis(2),
                })
            } else {
                Err(RemoteFailure::new("connection refused"))
            }
        }
    }

    struct MockFallback {
        calls: AtomicU32,
        reasons: Mutex<Vec<FallbackReason>>,
    }

    impl MockFallback {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                reasons: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FallbackPort for MockFallback {
        fn supports(&self, tool_name: &str) -> bool {
            tool_name == "list_products" || tool_name == "search_customers"
        }

        fn supported_tools(&self) -> Vec<String> {
            vec!["list_products".into(), "search_customers".into()]
        }

        async fn execute_fallback(&self, call: &ToolCall) -> Result<Value, FallbackError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.supports(&call.tool_name) {
                return Err(FallbackError::UnsupportedTool(call.tool_name.clone()));
            }
            Ok(json!({"status": "success", "results": [], "row_count": 0, "fallback": true}))
        }

        fn enable_fallback(&self, reason: &str) {
            self.reasons.lock().push(FallbackReason {
                reason: reason.to_string(),
                at: Utc::now(),
            });
        }

        fn disable_fallback(&self) {
            self.reasons.lock().clear();
        }

        fn fallback_status(&self) -> FallbackStatus {
            let reasons = self.reasons.lock().clone();
            FallbackStatus {
                enabled: !reasons.is_empty(),
                reasons,
                supported_tools: self.supported_tools(),
                store: "mock".into(),
                store_available: true,
            }
        }
    }

    fn list_products() -> ToolCall {
        ToolCall::new("list_products")
    }

    fn quick_strategy() -> RecoveryStrategy {
        RecoveryStrategy::default()
            .with_max_retries(1)
            .with_error_threshold(3)
            .with_recovery_window(Duration::from_secs(300))
    }

    /// Let spawned recovery tasks run to completion
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // ==================== Tests ====================

    #[tokio::test]
    async fn test_healthy_primary_returns_primary_result() {
        let remote = MockRemote::new(true);
        let orchestrator = Orchestrator::builder(remote.clone()).build();

        let result = orchestrator.execute_tool(&list_products()).await;

        assert!(result.success);
        assert_eq!(result.mode, ExecutionMode::Primary);
        assert_eq!(result.retries, 0);
        assert_eq!(result.payload.unwrap()["results"][0], "list_products");
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried_with_backoff() {
        let remote = MockRemote::new(true);
        remote.fail_next(&["request timed out", "request timed out"]);
        let orchestrator = Orchestrator::builder(remote.clone())
            .with_strategy(RecoveryStrategy::default().with_max_retries(3))
            .build();

        let started = Instant::now();
        let result = orchestrator.execute_tool(&list_products()).await;

        assert!(result.success);
        assert_eq!(result.mode, ExecutionMode::Primary);
        assert_eq!(result.retries, 2);
        // 1s + 2s
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(orchestrator.get_status().consecutive_errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_over_then_recovers_to_primary() {
        let remote = MockRemote::new(false);
        let fallback = MockFallback::new();
        let orchestrator = Orchestrator::builder(remote.clone())
            .with_fallback(fallback.clone())
            .with_strategy(quick_strategy())
            .build();

        for _ in 0..3 {
            let result = orchestrator.execute_tool(&list_products()).await;
            assert!(result.success);
            assert_eq!(result.mode, ExecutionMode::Fallback);
        }
        settle().await;

        // first recovery attempt right after failover found the primary down
        assert_eq!(orchestrator.mode(), ExecutionMode::Fallback);
        let status = orchestrator.get_status();
        assert_eq!(status.consecutive_errors, 3);
        assert_eq!(status.recovery_attempts, 1);
        assert!(
            fallback.fallback_status().reasons[0]
                .reason
                .contains("3 consecutive primary errors")
        );

        remote.set_healthy(true);
        let calls_before = remote.calls();
        let result = orchestrator.execute_tool(&list_products()).await;
        settle().await;
        assert_eq!(result.mode, ExecutionMode::Fallback);
        assert_eq!(remote.calls(), calls_before);
        // recovery window has not elapsed yet
        assert_eq!(orchestrator.mode(), ExecutionMode::Fallback);

        tokio::time::sleep(Duration::from_secs(301)).await;
        let result = orchestrator.execute_tool(&list_products()).await;
        assert_eq!(result.mode, ExecutionMode::Fallback);
        settle().await;

        assert_eq!(orchestrator.mode(), ExecutionMode::Primary);
        assert!(!fallback.fallback_status().enabled);
        let result = orchestrator.execute_tool(&list_products()).await;
        assert_eq!(result.mode, ExecutionMode::Primary);

        let modes: Vec<ExecutionMode> = orchestrator
            .get_status()
            .recent_mode_changes
            .iter()
            .map(|c| c.to)
            .collect();
        assert_eq!(
            modes,
            vec![
                ExecutionMode::Fallback,
                ExecutionMode::Recovery,
                ExecutionMode::Fallback,
                ExecutionMode::Recovery,
                ExecutionMode::Primary,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_fallback_degrades() {
        let remote = MockRemote::new(false);
        let orchestrator = Orchestrator::builder(remote.clone())
            .with_strategy(quick_strategy())
            .build();

        for _ in 0..3 {
            let result = orchestrator.execute_tool(&list_products()).await;
            assert!(!result.success);
            assert_eq!(result.mode, ExecutionMode::Degraded);
            assert!(
                result
                    .error
                    .as_deref()
                    .unwrap()
                    .starts_with("All execution methods failed")
            );
        }
        assert_eq!(orchestrator.mode(), ExecutionMode::Degraded);

        let calls_before = remote.calls();
        let result = orchestrator.execute_tool(&list_products()).await;
        assert!(!result.success);
        assert_eq!(result.mode, ExecutionMode::Degraded);
        assert_eq!(remote.calls(), calls_before);
    }

    #[tokio::test]
    async fn test_validation_failure_is_not_retried() {
        let remote = MockRemote::new(true);
        let fallback = MockFallback::new();
        let orchestrator = Orchestrator::builder(remote.clone())
            .with_fallback(fallback.clone())
            .build();

        let call = ToolCall::new("add_order_item")
            .with_param("order_id", 1)
            .with_param("product_id", 2)
            .with_param("quantity", 0);
        let result = orchestrator.execute_tool(&call).await;

        assert!(!result.success);
        assert_eq!(result.mode, ExecutionMode::Primary);
        assert!(result.error.unwrap().contains("quantity"));
        assert_eq!(remote.calls(), 0);
        assert_eq!(fallback.calls(), 0);
        assert_eq!(
            orchestrator.planner().statistics().error_counts["validation"],
            1
        );
    }

    #[tokio::test]
    async fn test_open_breaker_skips_primary() {
        let remote = MockRemote::new(true);
        remote.fail_next(&["HTTP 500: internal server error"]);
        let fallback = MockFallback::new();
        let planner = RecoveryPlanner::default()
            .with_breaker_config(CircuitBreakerConfig::default().with_failure_threshold(1));
        let orchestrator = Orchestrator::builder(remote.clone())
            .with_fallback(fallback.clone())
            .with_planner(planner)
            .build();

        let first = orchestrator.execute_tool(&list_products()).await;
        assert_eq!(first.mode, ExecutionMode::Fallback);
        assert_eq!(remote.calls(), 1);

        let second = orchestrator.execute_tool(&list_products()).await;
        assert!(second.success);
        assert_eq!(second.mode, ExecutionMode::Fallback);
        assert_eq!(remote.calls(), 1);
        assert_eq!(fallback.calls(), 2);
        // breaker rejections do not count toward failover
        assert_eq!(orchestrator.get_status().consecutive_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_primary_fails_over() {
        let remote = MockRemote::new(true);
        remote.fail_next(&["HTTP 429: too many requests", "HTTP 429: too many requests"]);
        let fallback = MockFallback::new();
        let orchestrator = Orchestrator::builder(remote.clone())
            .with_fallback(fallback.clone())
            .build();

        let result = orchestrator.execute_tool(&list_products()).await;

        assert!(result.success);
        assert_eq!(result.mode, ExecutionMode::Fallback);
        assert_eq!(remote.calls(), 2);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_fails_over() {
        let remote = MockRemote::new(true);
        remote.fail_next(&["HTTP 401: Unauthorized", "HTTP 401: Unauthorized"]);
        let fallback = MockFallback::new();
        let orchestrator = Orchestrator::builder(remote.clone())
            .with_fallback(fallback.clone())
            .build();

        let result = orchestrator.execute_tool(&list_products()).await;

        assert!(result.success);
        assert_eq!(result.mode, ExecutionMode::Fallback);
        assert_eq!(remote.calls(), 2);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_without_fallback_support_degrades() {
        let remote = MockRemote::new(true);
        remote.fail_next(&["HTTP 429: too many requests", "HTTP 429: too many requests"]);
        let fallback = MockFallback::new();
        let orchestrator = Orchestrator::builder(remote.clone())
            .with_fallback(fallback.clone())
            .build();

        let result = orchestrator
            .execute_tool(&ToolCall::new("create_order").with_param("customer_id", 7))
            .await;

        assert!(!result.success);
        assert_eq!(result.mode, ExecutionMode::Degraded);
        assert!(result.error.unwrap().contains("no fallback for tool 'create_order'"));
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_remote_validation_error_is_returned_without_fallback() {
        let remote = MockRemote::new(true);
        remote.fail_next(&["HTTP 400: invalid parameter"]);
        let fallback = MockFallback::new();
        let orchestrator = Orchestrator::builder(remote.clone())
            .with_fallback(fallback.clone())
            .build();

        let result = orchestrator.execute_tool(&list_products()).await;

        assert!(!result.success);
        assert_eq!(result.mode, ExecutionMode::Primary);
        assert_eq!(result.error.as_deref(), Some("HTTP 400: invalid parameter"));
        assert_eq!(remote.calls(), 1);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_planner_retry_is_gated_by_open_breaker() {
        let remote = MockRemote::new(true);
        remote.fail_next(&["HTTP 429: too many requests"]);
        let fallback = MockFallback::new();
        let planner = RecoveryPlanner::default()
            .with_breaker_config(CircuitBreakerConfig::default().with_failure_threshold(1));
        let orchestrator = Orchestrator::builder(remote.clone())
            .with_fallback(fallback.clone())
            .with_planner(planner)
            .build();

        let result = orchestrator.execute_tool(&list_products()).await;

        // the breaker opened on the first failure, so the retry never reached the remote
        assert_eq!(remote.calls(), 1);
        assert!(result.success);
        assert_eq!(result.mode, ExecutionMode::Fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_planner_retry_feeds_breaker() {
        let remote = MockRemote::new(true);
        remote.fail_next(&["request timed out", "request timed out"]);
        let fallback = MockFallback::new();
        let planner = RecoveryPlanner::default()
            .with_breaker_config(CircuitBreakerConfig::default().with_failure_threshold(2));
        let orchestrator = Orchestrator::builder(remote.clone())
            .with_fallback(fallback.clone())
            .with_planner(planner)
            .with_strategy(quick_strategy())
            .build();

        let result = orchestrator.execute_tool(&list_products()).await;

        assert!(result.success);
        assert_eq!(result.mode, ExecutionMode::Fallback);
        assert_eq!(remote.calls(), 2);
        let breakers = orchestrator.planner().breaker_states();
        assert_eq!(breakers["list_products"].state, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_recovery_requires_listed_tools() {
        let remote = MockRemote::new(true);
        remote.tool_count.store(0, Ordering::SeqCst);
        let orchestrator = Orchestrator::builder(remote.clone())
            .with_fallback(MockFallback::new())
            .build();
        orchestrator.force_mode(ExecutionMode::Fallback, "maintenance");

        assert!(!orchestrator.attempt_recovery().await);
        assert_eq!(orchestrator.mode(), ExecutionMode::Fallback);

        remote.tool_count.store(3, Ordering::SeqCst);
        assert!(orchestrator.attempt_recovery().await);
        assert_eq!(orchestrator.mode(), ExecutionMode::Primary);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_events_drive_failover_and_recovery() {
        let remote = MockRemote::new(false);
        let fallback = MockFallback::new();
        let monitor = Arc::new(HealthMonitor::new(
            MonitorParams::default().with_failure_threshold(1),
        ));
        monitor.add_target(remote.clone());
        let orchestrator = Orchestrator::builder(remote.clone())
            .with_fallback(fallback.clone())
            .with_monitor(monitor.clone())
            .build();

        monitor.check_now().await;
        assert_eq!(orchestrator.mode(), ExecutionMode::Fallback);
        assert_eq!(
            fallback.fallback_status().reasons[0].reason,
            "primary target unhealthy"
        );

        remote.set_healthy(true);
        monitor.check_now().await;
        settle().await;
        assert_eq!(orchestrator.mode(), ExecutionMode::Primary);
    }

    #[tokio::test]
    async fn test_initialize_picks_mode_and_shutdown_releases() {
        let remote = MockRemote::new(false);
        let with_fallback = Orchestrator::builder(remote.clone())
            .with_fallback(MockFallback::new())
            .build();
        assert!(with_fallback.initialize().await);
        assert_eq!(with_fallback.mode(), ExecutionMode::Fallback);

        let without = Orchestrator::builder(remote.clone()).build();
        assert!(!without.initialize().await);
        assert_eq!(without.mode(), ExecutionMode::Degraded);

        let healthy = MockRemote::new(true);
        let orchestrator = Orchestrator::builder(healthy.clone()).build();
        assert!(orchestrator.initialize().await);
        assert_eq!(orchestrator.mode(), ExecutionMode::Primary);
        orchestrator.shutdown().await;
        assert_eq!(healthy.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_mode_and_status() {
        let remote = MockRemote::new(true);
        let orchestrator = Orchestrator::builder(remote.clone()).build();
        orchestrator.execute_tool(&list_products()).await;

        orchestrator.force_mode(ExecutionMode::Degraded, "maintenance");

        let status = orchestrator.get_status();
        assert_eq!(status.mode, ExecutionMode::Degraded);
        assert_eq!(
            status.recent_mode_changes.last().unwrap().reason,
            "forced: maintenance"
        );
        assert_eq!(status.mode_metrics.len(), 4);
        assert_eq!(status.mode_metrics["primary"].executions, 1);
        assert_eq!(status.mode_metrics["primary"].success_rate, 100.0);
        assert!(status.fallback.is_none());
        assert!(status.monitor.is_none());
        assert!(serde_json::to_value(&status).is_ok());
    }
}
