//! Circuit breaker state machine.
//!
//! ```text
//!            failure_threshold failures
//!   CLOSED ─────────────────────────────▶ OPEN
//!     ▲                                    │ recovery_timeout elapsed
//!     │ success_threshold successes        ▼ (checked by can_execute)
//!     └──────────────────────────────── HALF_OPEN
//!                     any failure ──────▶ OPEN
//! ```
//!
//! Every method has an `_at` variant taking the current [`Instant`], so the
//! caller decides which clock drives the breaker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failures in CLOSED before the circuit opens
    pub failure_threshold: u32,
    /// Time since the last failure before OPEN lets a trial call through
    pub recovery_timeout: Duration,
    /// Successes in HALF_OPEN before the circuit closes
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }
}

/// Serializable view of a breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub state_changed_at: DateTime<Utc>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    state_changed_at: DateTime<Utc>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            last_failure_at: None,
            state_changed_at: Utc::now(),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn can_execute(&mut self) -> bool {
        self.can_execute_at(Instant::now())
    }

    /// Whether a call may proceed. An OPEN breaker whose timeout has elapsed
    /// moves to HALF_OPEN and admits the call.
    pub fn can_execute_at(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled_down = self
                    .last_failure
                    .is_none_or(|at| now.saturating_duration_since(at) > self.config.recovery_timeout);
                if cooled_down {
                    self.transition(CircuitState::HalfOpen);
                    self.success_count = 0;
                }
                cooled_down
            }
        }
    }

    pub fn call_succeeded(&mut self) {
        match self.state {
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= self.config.success_threshold {
                    self.transition(CircuitState::Closed);
                    self.failure_count = 0;
                    self.success_count = 0;
                }
            }
            CircuitState::Closed => self.failure_count = 0,
            CircuitState::Open => {}
        }
    }

    pub fn call_failed(&mut self) {
        self.call_failed_at(Instant::now());
    }

    pub fn call_failed_at(&mut self, now: Instant) {
        self.last_failure = Some(now);
        self.last_failure_at = Some(Utc::now());

        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= self.config.failure_threshold {
                    self.open();
                }
            }
            CircuitState::HalfOpen => self.open(),
            CircuitState::Open => {}
        }
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        CircuitBreakerStatus {
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            state_changed_at: self.state_changed_at,
            last_failure_at: self.last_failure_at,
        }
    }

    fn open(&mut self) {
        self.transition(CircuitState::Open);
        self.failure_count = 0;
        self.success_count = 0;
    }

    fn transition(&mut self, to: CircuitState) {
        self.state = to;
        self.state_changed_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig::default()
                .with_failure_threshold(3)
                .with_recovery_timeout(Duration::from_secs(60))
                .with_success_threshold(2),
        )
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let mut cb = breaker();
        let t0 = Instant::now();

        cb.call_failed_at(t0);
        cb.call_failed_at(t0);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_execute_at(t0));

        cb.call_failed_at(t0);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute_at(t0 + Duration::from_secs(30)));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_half_open_after_timeout_then_closes() {
        let mut cb = breaker();
        let t0 = Instant::now();
        for _ in 0..3 {
            cb.call_failed_at(t0);
        }

        assert!(cb.can_execute_at(t0 + Duration::from_secs(61)));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.call_succeeded();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.call_succeeded();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.status().failure_count, 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let mut cb = breaker();
        let t0 = Instant::now();
        for _ in 0..3 {
            cb.call_failed_at(t0);
        }
        let t1 = t0 + Duration::from_secs(61);
        assert!(cb.can_execute_at(t1));

        cb.call_failed_at(t1);
        assert_eq!(cb.state(), CircuitState::Open);
        // timeout counts from the latest failure
        assert!(!cb.can_execute_at(t1 + Duration::from_secs(30)));
    }

    #[test]
    fn test_success_in_closed_resets_failures() {
        let mut cb = breaker();
        let t0 = Instant::now();
        cb.call_failed_at(t0);
        cb.call_failed_at(t0);
        cb.call_succeeded();
        cb.call_failed_at(t0);
        cb.call_failed_at(t0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_status_snapshot() {
        let mut cb = breaker();
        assert!(cb.status().last_failure_at.is_none());
        cb.call_failed();
        let status = cb.status();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.failure_count, 1);
        assert!(status.last_failure_at.is_some());
        assert_eq!(
            serde_json::to_value(CircuitState::HalfOpen).unwrap(),
            serde_json::json!("half_open")
        );
    }
}
