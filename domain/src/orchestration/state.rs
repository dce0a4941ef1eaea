//! Orchestrator mode state machine.
//!
//! ```text
//!             consecutive errors >= threshold
//!             or primary reported unhealthy
//!   PRIMARY ─────────────────────────────────▶ FALLBACK / DEGRADED
//!      ▲                                            │ recovery due, or
//!      │ probe succeeded                            │ primary reported healthy
//!      │                                            ▼
//!      └──────────────────────────────────────  RECOVERY
//!                 probe failed ──▶ back to the mode recovery started from
//! ```
//!
//! [`ModeState`] only holds the rules. The owner serializes access to it
//! and performs the probing.

use super::mode::ExecutionMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Number of mode changes kept in the history
pub const MODE_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeChange {
    pub from: ExecutionMode,
    pub to: ExecutionMode,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ModeState {
    mode: ExecutionMode,
    recovering_from: Option<ExecutionMode>,
    consecutive_errors: u32,
    error_threshold: u32,
    fallback_available: bool,
    last_recovery_attempt: Option<Instant>,
    last_recovery_attempt_at: Option<DateTime<Utc>>,
    recovery_attempts: u64,
    history: VecDeque<ModeChange>,
}

impl ModeState {
    pub fn new(error_threshold: u32, fallback_available: bool) -> Self {
        Self {
            mode: ExecutionMode::Primary,
            recovering_from: None,
            consecutive_errors: 0,
            error_threshold: error_threshold.max(1),
            fallback_available,
            last_recovery_attempt: None,
            last_recovery_attempt_at: None,
            recovery_attempts: 0,
            history: VecDeque::new(),
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn recovery_attempts(&self) -> u64 {
        self.recovery_attempts
    }

    pub fn last_recovery_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_recovery_attempt_at
    }

    /// FALLBACK when a fallback executor exists, DEGRADED otherwise
    pub fn failover_mode(&self) -> ExecutionMode {
        if self.fallback_available {
            ExecutionMode::Fallback
        } else {
            ExecutionMode::Degraded
        }
    }

    /// Move to `to`, recording the change. No-op when already there.
    pub fn transition(&mut self, to: ExecutionMode, reason: impl Into<String>) -> Option<ModeChange> {
        if self.mode == to {
            return None;
        }
        let change = ModeChange {
            from: self.mode,
            to,
            reason: reason.into(),
            at: Utc::now(),
        };
        self.mode = to;
        if to != ExecutionMode::Recovery {
            self.recovering_from = None;
        }
        self.history.push_back(change.clone());
        while self.history.len() > MODE_HISTORY_LIMIT {
            self.history.pop_front();
        }
        Some(change)
    }

    /// Initial routing decision from a startup probe
    pub fn start(&mut self, primary_reachable: bool) -> Option<ModeChange> {
        if primary_reachable {
            self.transition(ExecutionMode::Primary, "primary reachable at startup")
        } else {
            let target = self.failover_mode();
            self.transition(target, "primary unreachable at startup")
        }
    }

    pub fn record_primary_success(&mut self) {
        self.consecutive_errors = 0;
    }

    /// Count a failed primary call; fails over from PRIMARY at the threshold
    pub fn record_primary_failure(&mut self) -> Option<ModeChange> {
        self.consecutive_errors += 1;
        if self.mode == ExecutionMode::Primary && self.consecutive_errors >= self.error_threshold {
            let target = self.failover_mode();
            let reason = format!("{} consecutive primary errors", self.consecutive_errors);
            return self.transition(target, reason);
        }
        None
    }

    /// Monitor reported the primary target unhealthy
    pub fn primary_unhealthy(&mut self) -> Option<ModeChange> {
        if self.mode != ExecutionMode::Primary {
            return None;
        }
        let target = self.failover_mode();
        self.transition(target, "primary target unhealthy")
    }

    /// Whether a fallback success should trigger a recovery attempt
    pub fn recovery_due(&self, now: Instant, window: Duration) -> bool {
        self.mode.is_failover()
            && self
                .last_recovery_attempt
                .is_none_or(|at| now.saturating_duration_since(at) >= window)
    }

    /// Enter RECOVERY from a failover mode
    pub fn begin_recovery(&mut self, now: Instant, reason: impl Into<String>) -> Option<ModeChange> {
        if !self.mode.is_failover() {
            return None;
        }
        let from = self.mode;
        self.last_recovery_attempt = Some(now);
        self.last_recovery_attempt_at = Some(Utc::now());
        self.recovery_attempts += 1;
        let change = self.transition(ExecutionMode::Recovery, reason);
        self.recovering_from = Some(from);
        change
    }

    /// Leave RECOVERY according to the probe outcome.
    ///
    /// Does nothing if the mode was changed by someone else meanwhile.
    pub fn finish_recovery(&mut self, primary_alive: bool) -> Option<ModeChange> {
        if self.mode != ExecutionMode::Recovery {
            return None;
        }
        if primary_alive {
            self.consecutive_errors = 0;
            self.transition(ExecutionMode::Primary, "primary probe succeeded")
        } else {
            let back = self.recovering_from.unwrap_or_else(|| self.failover_mode());
            self.transition(back, "primary probe failed")
        }
    }

    /// Most recent `n` changes, oldest first
    pub fn recent_changes(&self, n: usize) -> Vec<ModeChange> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

/// Counters for results produced in one mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeStats {
    pub executions: u64,
    pub successes: u64,
    pub total_time: Duration,
}

impl ModeStats {
    pub fn success_rate(&self) -> f64 {
        if self.executions == 0 {
            return 0.0;
        }
        self.successes as f64 / self.executions as f64 * 100.0
    }

    pub fn average_time(&self) -> Duration {
        if self.executions == 0 {
            return Duration::ZERO;
        }
        self.total_time.div_f64(self.executions as f64)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModeMetrics {
    stats: HashMap<ExecutionMode, ModeStats>,
}

impl ModeMetrics {
    pub fn record(&mut self, mode: ExecutionMode, success: bool, elapsed: Duration) {
        let stats = self.stats.entry(mode).or_default();
        stats.executions += 1;
        if success {
            stats.successes += 1;
        }
        stats.total_time += elapsed;
    }

    pub fn get(&self, mode: ExecutionMode) -> ModeStats {
        self.stats.get(&mode).copied().unwrap_or_default()
    }

    /// Stats for every mode, including those with no executions
    pub fn snapshot(&self) -> Vec<(ExecutionMode, ModeStats)> {
        ExecutionMode::ALL
            .into_iter()
            .map(|mode| (mode, self.get(mode)))
            .collect()
    }
}
