//! Per-target health record and probe classification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    #[default]
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A status transition of one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub target: String,
    pub previous: HealthStatus,
    pub current: HealthStatus,
}

impl StatusChange {
    pub fn entered_unhealthy(&self) -> bool {
        self.current == HealthStatus::Unhealthy
    }

    pub fn entered_healthy(&self) -> bool {
        self.current == HealthStatus::Healthy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerHealth {
    pub name: String,
    pub url: String,
    pub status: HealthStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub response_time: Option<Duration>,
    pub available_tools: usize,
    pub error_message: Option<String>,
}

impl ServerHealth {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            status: HealthStatus::Unknown,
            last_check: None,
            last_success: None,
            consecutive_failures: 0,
            response_time: None,
            available_tools: 0,
            error_message: None,
        }
    }

    /// Apply a successful probe. HEALTHY when tools are advertised,
    /// DEGRADED when the target answers with none.
    pub fn record_success(
        &mut self,
        available_tools: usize,
        response_time: Duration,
        at: DateTime<Utc>,
    ) -> Option<StatusChange> {
        self.last_check = Some(at);
        self.last_success = Some(at);
        self.consecutive_failures = 0;
        self.response_time = Some(response_time);
        self.available_tools = available_tools;
        self.error_message = None;

        let status = if available_tools > 0 {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        self.set_status(status)
    }

    /// Apply a failed probe. UNHEALTHY once `failure_threshold` consecutive
    /// failures are reached, DEGRADED before that.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        response_time: Duration,
        failure_threshold: u32,
        at: DateTime<Utc>,
    ) -> Option<StatusChange> {
        self.last_check = Some(at);
        self.consecutive_failures += 1;
        self.response_time = Some(response_time);
        self.error_message = Some(error.into());

        let status = if self.consecutive_failures >= failure_threshold {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        };
        self.set_status(status)
    }

    fn set_status(&mut self, status: HealthStatus) -> Option<StatusChange> {
        let previous = self.status;
        self.status = status;
        (previous != status).then(|| StatusChange {
            target: self.name.clone(),
            previous,
            current: status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_with_tools_is_healthy() {
        let mut health = ServerHealth::new("primary", "http://localhost:8000");
        let change = health
            .record_success(4, Duration::from_millis(12), Utc::now())
            .unwrap();

        assert_eq!(change.previous, HealthStatus::Unknown);
        assert_eq!(change.current, HealthStatus::Healthy);
        assert!(change.entered_healthy());
        assert_eq!(health.available_tools, 4);
    }

    #[test]
    fn test_success_without_tools_is_degraded() {
        let mut health = ServerHealth::new("primary", "http://localhost:8000");
        health.record_success(0, Duration::ZERO, Utc::now());
        assert_eq!(health.status, HealthStatus::Degraded);
    }

    #[test]
    fn test_failures_escalate_to_unhealthy() {
        let mut health = ServerHealth::new("primary", "http://localhost:8000");
        health.record_success(2, Duration::ZERO, Utc::now());

        let first = health
            .record_failure("connection refused", Duration::ZERO, 3, Utc::now())
            .unwrap();
        assert_eq!(first.current, HealthStatus::Degraded);
        // no change while still below the threshold
        assert!(
            health
                .record_failure("connection refused", Duration::ZERO, 3, Utc::now())
                .is_none()
        );
        let third = health
            .record_failure("connection refused", Duration::ZERO, 3, Utc::now())
            .unwrap();
        assert!(third.entered_unhealthy());
        assert_eq!(health.consecutive_failures, 3);

        health.record_success(2, Duration::ZERO, Utc::now());
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.error_message.is_none());
    }
}
