//! Recovery planner use case.
//!
//! Given a classified failure ([`ErrorContext`]) the planner looks up the
//! static [`RecoveryPlan`] for its [`ErrorType`] and walks its actions in
//! order until one recovers:
//!
//! | Action | Effect |
//! |--------|--------|
//! | `Retry` | call `retry` if `retry_count < max_retries` |
//! | `RetryWithBackoff` | sleep `retry_delay × backoff_factor^retry_count`, then `retry` |
//! | `Fallback` | call `fallback` |
//! | `CircuitBreak` | mark the tool's breaker failed |
//! | `Fail` | stop |
//! | `RefreshAuth`, `ClearCache`, `RestartConnection` | not performed here |
//!
//! The planner also owns the per-tool circuit breakers, a bounded error
//! history and per-error-type listeners.

use super::listeners::{ListenerResult, Listeners};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Instant;
use toolguard_domain::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus, ErrorContext, ErrorType,
    RecoveryAction, RecoveryPlan, RecoveryPlans,
};
use tracing::{debug, info, warn};

/// Maximum number of error contexts kept
pub const ERROR_HISTORY_LIMIT: usize = 1000;

/// Number of errors reported by [`RecoveryPlanner::statistics`]
const RECENT_ERRORS: usize = 10;

/// A recovery step supplied by the caller (retry the call, run the fallback)
pub type RecoveryFn<'a, T> = Box<dyn FnMut() -> BoxFuture<'a, Result<T, String>> + Send + 'a>;

#[derive(Debug)]
pub enum RecoveryOutcome<T> {
    Recovered { action: RecoveryAction, value: T },
    Failed { last_error: Option<String> },
}

impl<T> RecoveryOutcome<T> {
    pub fn is_recovered(&self) -> bool {
        matches!(self, RecoveryOutcome::Recovered { .. })
    }
}

/// What listeners receive after each handled error
#[derive(Debug, Clone)]
pub struct RecoveryEvent {
    pub context: ErrorContext,
    pub recovered: bool,
    pub action: Option<RecoveryAction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentError {
    pub error_type: ErrorType,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub tool: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryStatistics {
    pub error_counts: BTreeMap<String, u64>,
    pub recovery_success_counts: BTreeMap<String, u64>,
    pub recovery_failure_counts: BTreeMap<String, u64>,
    pub circuit_breakers: BTreeMap<String, CircuitBreakerStatus>,
    pub recent_errors: Vec<RecentError>,
}

#[derive(Debug, Default)]
struct Counters {
    errors: HashMap<ErrorType, u64>,
    successes: HashMap<RecoveryAction, u64>,
    failures: HashMap<RecoveryAction, u64>,
}

/// Classifies failures into recovery actions and owns per-tool breakers
pub struct RecoveryPlanner {
    plans: RecoveryPlans,
    breaker_config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    counters: Mutex<Counters>,
    history: Mutex<VecDeque<ErrorContext>>,
    listeners: Listeners<RecoveryEvent>,
}

impl Default for RecoveryPlanner {
    fn default() -> Self {
        Self::new(RecoveryPlans::default())
    }
}

impl RecoveryPlanner {
    pub fn new(plans: RecoveryPlans) -> Self {
        Self {
            plans,
            breaker_config: CircuitBreakerConfig::default(),
            breakers: Mutex::new(HashMap::new()),
            counters: Mutex::new(Counters::default()),
            history: Mutex::new(VecDeque::new()),
            listeners: Listeners::default(),
        }
    }

    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    pub fn plan_for(&self, error_type: ErrorType) -> RecoveryPlan {
        self.plans.get(error_type)
    }

    // ==================== Circuit breakers ====================

    /// Whether the breaker for `tool` admits a call at `now`
    pub fn can_execute(&self, tool: &str, now: Instant) -> bool {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(tool.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.breaker_config))
            .can_execute_at(now)
    }

    pub fn record_success(&self, tool: &str) {
        if let Some(breaker) = self.breakers.lock().get_mut(tool) {
            breaker.call_succeeded();
        }
    }

    pub fn record_failure(&self, tool: &str, now: Instant) {
        let mut breakers = self.breakers.lock();
        let breaker = breakers
            .entry(tool.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.breaker_config));
        let before = breaker.state();
        breaker.call_failed_at(now);
        if breaker.state() != before {
            warn!(tool = tool, state = %breaker.state(), "Circuit breaker state changed");
        }
    }

    pub fn breaker_states(&self) -> BTreeMap<String, CircuitBreakerStatus> {
        self.breakers
            .lock()
            .iter()
            .map(|(tool, breaker)| (tool.clone(), breaker.status()))
            .collect()
    }

    // ==================== Listeners ====================

    /// Register a listener for one error type; it runs after every handled
    /// error of that type with the recovery outcome
    pub fn register_listener<F>(&self, error_type: ErrorType, listener: F)
    where
        F: Fn(&RecoveryEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.listeners
            .register(error_type.as_str(), move |event: &RecoveryEvent| {
                if event.context.error_type == error_type {
                    listener(event)
                } else {
                    Ok(())
                }
            });
    }

    // ==================== Handling ====================

    /// Run the recovery plan for `context`
    pub async fn handle<'a, T: Send>(
        &self,
        context: ErrorContext,
        mut retry: Option<RecoveryFn<'a, T>>,
        mut fallback: Option<RecoveryFn<'a, T>>,
    ) -> RecoveryOutcome<T> {
        self.record_error(&context);
        let plan = self.plans.get(context.error_type);
        debug!(
            error_type = %context.error_type,
            primary_action = %plan.primary_action,
            retry_count = context.retry_count,
            "Handling error"
        );

        let mut outcome = RecoveryOutcome::Failed { last_error: None };
        for action in plan.actions() {
            match self
                .execute_action(action, &context, &plan, &mut retry, &mut fallback)
                .await
            {
                Step::Recovered(value) => {
                    info!(action = %action, error_type = %context.error_type, "Recovered");
                    outcome = RecoveryOutcome::Recovered { action, value };
                    break;
                }
                Step::Failed(error) => {
                    warn!(action = %action, error = %error, "Recovery action failed");
                    outcome = RecoveryOutcome::Failed {
                        last_error: Some(error),
                    };
                }
                Step::Skipped => {}
                Step::GiveUp => break,
            }
        }

        {
            let mut counters = self.counters.lock();
            let bucket = if outcome.is_recovered() {
                &mut counters.successes
            } else {
                &mut counters.failures
            };
            *bucket.entry(plan.primary_action).or_default() += 1;
        }

        let action = match &outcome {
            RecoveryOutcome::Recovered { action, .. } => Some(*action),
            RecoveryOutcome::Failed { .. } => None,
        };
        self.listeners.notify(&RecoveryEvent {
            context,
            recovered: action.is_some(),
            action,
        });

        outcome
    }

    async fn execute_action<'a, T>(
        &self,
        action: RecoveryAction,
        context: &ErrorContext,
        plan: &RecoveryPlan,
        retry: &mut Option<RecoveryFn<'a, T>>,
        fallback: &mut Option<RecoveryFn<'a, T>>,
    ) -> Step<T> {
        match action {
            RecoveryAction::Retry | RecoveryAction::RetryWithBackoff => {
                let Some(retry) = retry.as_mut() else {
                    return Step::Skipped;
                };
                if context.retry_count >= plan.max_retries {
                    return Step::Skipped;
                }
                if action == RecoveryAction::RetryWithBackoff {
                    tokio::time::sleep(plan.backoff_delay(context.retry_count)).await;
                }
                retry().await.into()
            }
            RecoveryAction::Fallback => match fallback.as_mut() {
                Some(fallback) => fallback().await.into(),
                None => Step::Skipped,
            },
            RecoveryAction::CircuitBreak => {
                if let Some(tool) = &context.tool_name {
                    self.record_failure(tool, tokio::time::Instant::now().into_std());
                }
                Step::Skipped
            }
            RecoveryAction::Fail => Step::GiveUp,
            RecoveryAction::RefreshAuth
            | RecoveryAction::ClearCache
            | RecoveryAction::RestartConnection => {
                debug!(action = %action, "Recovery action is not available in this layer");
                Step::Skipped
            }
        }
    }

    fn record_error(&self, context: &ErrorContext) {
        *self
            .counters
            .lock()
            .errors
            .entry(context.error_type)
            .or_default() += 1;

        let mut history = self.history.lock();
        history.push_back(context.clone());
        while history.len() > ERROR_HISTORY_LIMIT {
            history.pop_front();
        }
    }

    pub fn error_history_len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn statistics(&self) -> RecoveryStatistics {
        let counters = self.counters.lock();
        let error_counts = ErrorType::ALL
            .iter()
            .map(|t| (t.to_string(), counters.errors.get(t).copied().unwrap_or(0)))
            .collect();
        let by_action = |map: &HashMap<RecoveryAction, u64>| {
            map.iter()
                .map(|(action, count)| (action.to_string(), *count))
                .collect::<BTreeMap<_, _>>()
        };
        let recovery_success_counts = by_action(&counters.successes);
        let recovery_failure_counts = by_action(&counters.failures);
        drop(counters);

        let history = self.history.lock();
        let skip = history.len().saturating_sub(RECENT_ERRORS);
        let recent_errors = history
            .iter()
            .skip(skip)
            .map(|ctx| RecentError {
                error_type: ctx.error_type,
                message: ctx.message.clone(),
                timestamp: ctx.timestamp,
                tool: ctx.tool_name.clone(),
            })
            .collect();
        drop(history);

        RecoveryStatistics {
            error_counts,
            recovery_success_counts,
            recovery_failure_counts,
            circuit_breakers: self.breaker_states(),
            recent_errors,
        }
    }

    pub fn reset_statistics(&self) {
        *self.counters.lock() = Counters::default();
        self.history.lock().clear();
        info!("Error recovery statistics reset");
    }
}

enum Step<T> {
    Recovered(T),
    Failed(String),
    Skipped,
    GiveUp,
}

impl<T> From<Result<T, String>> for Step<T> {
    fn from(result: Result<T, String>) -> Self {
        match result {
            Ok(value) => Step::Recovered(value),
            Err(error) => Step::Failed(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use toolguard_domain::CircuitState;

    fn counting<'a>(calls: &'a AtomicU32, result: Result<&'static str, &'static str>) -> RecoveryFn<'a, &'static str> {
        Box::new(move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                result.map_err(|e| e.to_string())
            }
            .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_retries_with_backoff() {
        let planner = RecoveryPlanner::default();
        let retries = AtomicU32::new(0);
        let fallbacks = AtomicU32::new(0);

        let started = tokio::time::Instant::now();
        let outcome = planner
            .handle(
                ErrorContext::from_message("request timed out").with_retry_count(1),
                Some(counting(&retries, Ok("retried"))),
                Some(counting(&fallbacks, Ok("fallback"))),
            )
            .await;

        match outcome {
            RecoveryOutcome::Recovered { action, value } => {
                assert_eq!(action, RecoveryAction::RetryWithBackoff);
                assert_eq!(value, "retried");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        // 1s × 2^1
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(retries.load(Ordering::SeqCst), 1);
        assert_eq!(fallbacks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fall_back() {
        let planner = RecoveryPlanner::default();
        let retries = AtomicU32::new(0);
        let fallbacks = AtomicU32::new(0);

        let outcome = planner
            .handle(
                ErrorContext::from_message("request timed out").with_retry_count(3),
                Some(counting(&retries, Ok("retried"))),
                Some(counting(&fallbacks, Ok("fallback"))),
            )
            .await;

        assert!(matches!(
            outcome,
            RecoveryOutcome::Recovered {
                action: RecoveryAction::Fallback,
                value: "fallback"
            }
        ));
        assert_eq!(retries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validation_never_retries_or_falls_back() {
        let planner = RecoveryPlanner::default();
        let retries = AtomicU32::new(0);
        let fallbacks = AtomicU32::new(0);

        let outcome = planner
            .handle(
                ErrorContext::from_message("Missing required parameter 'customer_id'"),
                Some(counting(&retries, Ok("retried"))),
                Some(counting(&fallbacks, Ok("fallback"))),
            )
            .await;

        assert!(!outcome.is_recovered());
        assert_eq!(retries.load(Ordering::SeqCst), 0);
        assert_eq!(fallbacks.load(Ordering::SeqCst), 0);
        let stats = planner.statistics();
        assert_eq!(stats.error_counts["validation"], 1);
        assert_eq!(stats.recovery_failure_counts["fail"], 1);
    }

    #[tokio::test]
    async fn test_server_error_marks_breaker_then_falls_back() {
        let planner = RecoveryPlanner::default().with_breaker_config(
            CircuitBreakerConfig::default().with_failure_threshold(1),
        );
        let fallbacks = AtomicU32::new(0);

        let outcome = planner
            .handle(
                ErrorContext::from_message("HTTP 503: unavailable").with_tool("list_products"),
                None,
                Some(counting(&fallbacks, Ok("fallback"))),
            )
            .await;

        assert!(outcome.is_recovered());
        assert_eq!(
            planner.breaker_states()["list_products"].state,
            CircuitState::Open
        );
        assert_eq!(planner.statistics().recovery_success_counts["circuit_break"], 1);
    }

    #[tokio::test]
    async fn test_failed_fallback_reports_last_error() {
        let planner = RecoveryPlanner::default();
        let fallbacks = AtomicU32::new(0);

        let outcome = planner
            .handle(
                ErrorContext::from_message("something odd").with_retry_count(5),
                None,
                Some(counting(&fallbacks, Err("store offline"))),
            )
            .await;

        match outcome {
            RecoveryOutcome::Failed { last_error } => {
                assert_eq!(last_error.as_deref(), Some("store offline"))
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_listeners_filtered_by_error_type() {
        let planner = RecoveryPlanner::default();
        let auth_events = Arc::new(AtomicU32::new(0));

        let seen = auth_events.clone();
        planner.register_listener(ErrorType::Auth, move |event| {
            assert!(!event.recovered);
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        planner.register_listener(ErrorType::Auth, |_| Err("listener broke".into()));

        planner
            .handle::<()>(ErrorContext::from_message("HTTP 401: Unauthorized"), None, None)
            .await;
        planner
            .handle::<()>(ErrorContext::from_message("HTTP 503"), None, None)
            .await;

        assert_eq!(auth_events.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_history_bounded_and_reset() {
        let planner = RecoveryPlanner::default();
        for i in 0..(ERROR_HISTORY_LIMIT + 5) {
            planner
                .handle::<()>(ErrorContext::from_message(format!("validation {}", i)), None, None)
                .await;
        }
        assert_eq!(planner.error_history_len(), ERROR_HISTORY_LIMIT);

        let stats = planner.statistics();
        assert_eq!(stats.recent_errors.len(), 10);
        assert_eq!(
            stats.recent_errors.last().unwrap().message,
            format!("validation {}", ERROR_HISTORY_LIMIT + 4)
        );

        planner.reset_statistics();
        assert_eq!(planner.error_history_len(), 0);
        assert_eq!(planner.statistics().error_counts["validation"], 0);
    }

    #[test]
    fn test_breaker_gating() {
        let planner = RecoveryPlanner::default().with_breaker_config(
            CircuitBreakerConfig::default()
                .with_failure_threshold(2)
                .with_recovery_timeout(Duration::from_secs(60)),
        );
        let t0 = Instant::now();
        assert!(planner.can_execute("search_customers", t0));
        planner.record_failure("search_customers", t0);
        planner.record_failure("search_customers", t0);
        assert!(!planner.can_execute("search_customers", t0));
        assert!(planner.can_execute("list_products", t0));
        assert!(planner.can_execute("search_customers", t0 + Duration::from_secs(61)));
    }
}
