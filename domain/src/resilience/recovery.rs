//! Recovery actions, plans and error context.
//!
//! One [`RecoveryPlan`] per [`ErrorType`], fixed at startup:
//!
//! | Error | Primary action | Fallback actions | Retries | Delay |
//! |-------|----------------|------------------|---------|-------|
//! | Connection | RestartConnection | RetryWithBackoff, Fallback | 5 | 2s |
//! | Timeout | RetryWithBackoff | Fallback | 3 | 1s |
//! | Validation | Fail | - | 0 | - |
//! | RateLimit | RetryWithBackoff (x3) | CircuitBreak | 3 | 5s |
//! | Auth | RefreshAuth | Fail | 2 | 1s |
//! | Server | CircuitBreak (10 min) | Fallback | 3 | 1s |
//! | Unknown | Retry | Fallback, Fail | 2 | 1s |

use super::error_type::{ErrorType, classify};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    RetryWithBackoff,
    Fallback,
    CircuitBreak,
    RefreshAuth,
    ClearCache,
    RestartConnection,
    Fail,
}

impl RecoveryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryAction::Retry => "retry",
            RecoveryAction::RetryWithBackoff => "retry_with_backoff",
            RecoveryAction::Fallback => "fallback",
            RecoveryAction::CircuitBreak => "circuit_break",
            RecoveryAction::RefreshAuth => "refresh_auth",
            RecoveryAction::ClearCache => "clear_cache",
            RecoveryAction::RestartConnection => "restart_connection",
            RecoveryAction::Fail => "fail",
        }
    }

    /// Actions this layer recognises but has no means to perform
    pub fn requires_external(&self) -> bool {
        matches!(
            self,
            RecoveryAction::RefreshAuth | RecoveryAction::ClearCache | RecoveryAction::RestartConnection
        )
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPlan {
    pub primary_action: RecoveryAction,
    pub fallback_actions: Vec<RecoveryAction>,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff_factor: f64,
    pub circuit_break_duration: Duration,
}

impl RecoveryPlan {
    pub fn new(primary_action: RecoveryAction) -> Self {
        Self {
            primary_action,
            fallback_actions: Vec::new(),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            circuit_break_duration: Duration::from_secs(5 * 60),
        }
    }

    pub fn then(mut self, action: RecoveryAction) -> Self {
        self.fallback_actions.push(action);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_circuit_break_duration(mut self, duration: Duration) -> Self {
        self.circuit_break_duration = duration;
        self
    }

    /// Primary action followed by the fallback actions, in order
    pub fn actions(&self) -> impl Iterator<Item = RecoveryAction> + '_ {
        std::iter::once(self.primary_action).chain(self.fallback_actions.iter().copied())
    }

    /// `retry_delay × backoff_factor^retry_count`
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        self.retry_delay
            .mul_f64(self.backoff_factor.powi(retry_count as i32))
    }

    /// Built-in plan for an error type
    pub fn for_error(error_type: ErrorType) -> Self {
        use RecoveryAction::*;
        match error_type {
            ErrorType::Connection => RecoveryPlan::new(RestartConnection)
                .then(RetryWithBackoff)
                .then(Fallback)
                .with_max_retries(5)
                .with_retry_delay(Duration::from_secs(2)),
            ErrorType::Timeout => RecoveryPlan::new(RetryWithBackoff)
                .then(Fallback)
                .with_max_retries(3),
            ErrorType::Validation => RecoveryPlan::new(Fail).with_max_retries(0),
            ErrorType::RateLimit => RecoveryPlan::new(RetryWithBackoff)
                .then(CircuitBreak)
                .with_max_retries(3)
                .with_retry_delay(Duration::from_secs(5))
                .with_backoff_factor(3.0),
            ErrorType::Auth => RecoveryPlan::new(RefreshAuth).then(Fail).with_max_retries(2),
            ErrorType::Server => RecoveryPlan::new(CircuitBreak)
                .then(Fallback)
                .with_circuit_break_duration(Duration::from_secs(10 * 60)),
            ErrorType::Unknown => RecoveryPlan::new(Retry)
                .then(Fallback)
                .then(Fail)
                .with_max_retries(2),
        }
    }
}

/// Plan table keyed by error type
#[derive(Debug, Clone)]
pub struct RecoveryPlans {
    plans: HashMap<ErrorType, RecoveryPlan>,
}

impl Default for RecoveryPlans {
    fn default() -> Self {
        Self {
            plans: ErrorType::ALL
                .into_iter()
                .map(|t| (t, RecoveryPlan::for_error(t)))
                .collect(),
        }
    }
}

impl RecoveryPlans {
    pub fn with_plan(mut self, error_type: ErrorType, plan: RecoveryPlan) -> Self {
        self.plans.insert(error_type, plan);
        self
    }

    /// Plan for `error_type`, or the `Unknown` plan when none is registered
    pub fn get(&self, error_type: ErrorType) -> RecoveryPlan {
        self.plans
            .get(&error_type)
            .or_else(|| self.plans.get(&ErrorType::Unknown))
            .cloned()
            .unwrap_or_else(|| RecoveryPlan::for_error(ErrorType::Unknown))
    }

    /// Scale every plan's retry delay (used to shorten waits in local setups)
    pub fn scale_delays(mut self, factor: f64) -> Self {
        for plan in self.plans.values_mut() {
            plan.retry_delay = plan.retry_delay.mul_f64(factor);
        }
        self
    }
}

/// One observed failure, as handed to the recovery planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub error_type: ErrorType,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub tool_name: Option<String>,
    pub parameters: Option<BTreeMap<String, Value>>,
    pub retry_count: u32,
}

impl ErrorContext {
    /// Build a context, classifying the message
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            error_type: classify(&message),
            message,
            timestamp: Utc::now(),
            tool_name: None,
            parameters: None,
            retry_count: 0,
        }
    }

    pub fn with_error_type(mut self, error_type: ErrorType) -> Self {
        self.error_type = error_type;
        self
    }

    pub fn with_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, Value>) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_table_matches_error_types() {
        let plans = RecoveryPlans::default();

        let connection = plans.get(ErrorType::Connection);
        assert_eq!(connection.primary_action, RecoveryAction::RestartConnection);
        assert_eq!(
            connection.fallback_actions,
            vec![RecoveryAction::RetryWithBackoff, RecoveryAction::Fallback]
        );
        assert_eq!(connection.max_retries, 5);

        let validation = plans.get(ErrorType::Validation);
        assert_eq!(validation.actions().collect::<Vec<_>>(), vec![RecoveryAction::Fail]);

        let server = plans.get(ErrorType::Server);
        assert_eq!(server.circuit_break_duration, Duration::from_secs(600));
    }

    #[test]
    fn test_backoff_delay() {
        let plan = RecoveryPlan::for_error(ErrorType::RateLimit);
        assert_eq!(plan.backoff_delay(0), Duration::from_secs(5));
        assert_eq!(plan.backoff_delay(2), Duration::from_secs(45));
    }

    #[test]
    fn test_scale_delays() {
        let plans = RecoveryPlans::default().scale_delays(0.5);
        assert_eq!(
            plans.get(ErrorType::Connection).retry_delay,
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_external_actions() {
        assert!(RecoveryAction::RefreshAuth.requires_external());
        assert!(RecoveryAction::ClearCache.requires_external());
        assert!(RecoveryAction::RestartConnection.requires_external());
        assert!(!RecoveryAction::Fallback.requires_external());
    }

    #[test]
    fn test_error_context_classifies() {
        let ctx = ErrorContext::from_message("HTTP 503: busy")
            .with_tool("list_products")
            .with_retry_count(2);
        assert_eq!(ctx.error_type, ErrorType::Server);
        assert_eq!(ctx.tool_name.as_deref(), Some("list_products"));
        assert_eq!(ctx.retry_count, 2);
    }
}
