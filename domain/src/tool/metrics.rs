//! Per-tool execution metrics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Running counters for one tool.
///
/// Counters only grow. Rates and averages are derived on read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolMetrics {
    pub tool_name: String,
    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub total_duration: Duration,
    pub last_execution: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ToolMetrics {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            ..Default::default()
        }
    }

    /// Count a new call (once per call, regardless of retries)
    pub fn record_execution(&mut self, at: DateTime<Utc>) {
        self.execution_count += 1;
        self.last_execution = Some(at);
    }

    pub fn record_success(&mut self, duration: Duration) {
        self.success_count += 1;
        self.total_duration += duration;
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.failure_count += 1;
        self.last_error = Some(error.into());
    }

    /// Success rate as a percentage (0.0 when nothing ran yet)
    pub fn success_rate(&self) -> f64 {
        if self.execution_count == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.execution_count as f64 * 100.0
    }

    /// Average duration of successful calls
    pub fn average_duration(&self) -> Duration {
        if self.success_count == 0 {
            return Duration::ZERO;
        }
        self.total_duration.div_f64(self.success_count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_duration_with_large_counter() {
        let mut metrics = ToolMetrics::new("list_products");
        metrics.success_count = u64::from(u32::MAX) + 1;
        metrics.total_duration = Duration::from_secs(2 << 32);
        assert_eq!(metrics.average_duration(), Duration::from_secs(2));
    }

    #[test]
    fn test_derived_values_on_empty_metrics() {
        let metrics = ToolMetrics::new("list_products");
        assert_eq!(metrics.success_rate(), 0.0);
        assert_eq!(metrics.average_duration(), Duration::ZERO);
    }

    #[test]
    fn test_success_rate_and_average() {
        let mut metrics = ToolMetrics::new("list_products");
        let now = Utc::now();
        for ms in [100, 300] {
            metrics.record_execution(now);
            metrics.record_success(Duration::from_millis(ms));
        }
        metrics.record_execution(now);
        metrics.record_failure("HTTP 500: oops");

        assert_eq!(metrics.execution_count, 3);
        assert!((metrics.success_rate() - 66.666).abs() < 0.01);
        assert_eq!(metrics.average_duration(), Duration::from_millis(200));
        assert_eq!(metrics.last_error.as_deref(), Some("HTTP 500: oops"));
    }
}
