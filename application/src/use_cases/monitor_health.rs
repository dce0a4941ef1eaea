//! Health monitor use case.
//!
//! Probes every registered target on a fixed interval and keeps one
//! [`ServerHealth`] record per target. Status transitions are published to
//! three listener lists, in this order:
//!
//! ```text
//!  probe ──► ServerHealth ──► StatusChange ─┬─► status listeners (always)
//!                                           ├─► failure listeners (entering UNHEALTHY)
//!                                           └─► recovery listeners (entering HEALTHY)
//! ```
//!
//! The periodic loop is a single spawned task owned by the monitor. It holds
//! only a weak reference back, and is cancelled by [`HealthMonitor::stop`] or
//! when the monitor is dropped.

use super::listeners::{ListenerResult, Listeners};
use crate::config::MonitorParams;
use crate::ports::remote_tools::HealthProbe;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use toolguard_domain::{HealthStatus, ServerHealth, StatusChange};
use tracing::{debug, info, warn};

struct MonitorTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatistics {
    pub uptime_secs: f64,
    pub running: bool,
    pub total_checks: u64,
    pub total_failures: u64,
    pub servers_monitored: usize,
    pub healthy_servers: usize,
    pub check_interval_secs: f64,
    pub failure_threshold: u32,
    pub servers: Vec<ServerHealth>,
}

pub struct HealthMonitor {
    params: MonitorParams,
    targets: RwLock<Vec<Arc<dyn HealthProbe>>>,
    health: RwLock<BTreeMap<String, ServerHealth>>,
    total_checks: AtomicU64,
    total_failures: AtomicU64,
    created_at: DateTime<Utc>,
    status_listeners: Listeners<StatusChange>,
    failure_listeners: Listeners<StatusChange>,
    recovery_listeners: Listeners<StatusChange>,
    task: Mutex<Option<MonitorTask>>,
}

impl HealthMonitor {
    pub fn new(params: MonitorParams) -> Self {
        Self {
            params,
            targets: RwLock::new(Vec::new()),
            health: RwLock::new(BTreeMap::new()),
            total_checks: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            created_at: Utc::now(),
            status_listeners: Listeners::default(),
            failure_listeners: Listeners::default(),
            recovery_listeners: Listeners::default(),
            task: Mutex::new(None),
        }
    }

    pub fn params(&self) -> &MonitorParams {
        &self.params
    }

    // ==================== Targets ====================

    /// Register a target; a target with the same name is replaced
    pub fn add_target(&self, probe: Arc<dyn HealthProbe>) {
        let name = probe.target_name().to_string();
        self.health
            .write()
            .insert(name.clone(), ServerHealth::new(&name, probe.target_url()));

        let mut targets = self.targets.write();
        targets.retain(|t| t.target_name() != name);
        targets.push(probe);
        info!(target_name = %name, "Added health monitor target");
    }

    pub fn remove_target(&self, name: &str) -> bool {
        let mut targets = self.targets.write();
        let before = targets.len();
        targets.retain(|t| t.target_name() != name);
        let removed = targets.len() != before;
        drop(targets);

        self.health.write().remove(name);
        if removed {
            info!(target_name = %name, "Removed health monitor target");
        }
        removed
    }

    // ==================== Listeners ====================

    pub fn on_status_change<F>(&self, name: &str, listener: F)
    where
        F: Fn(&StatusChange) -> ListenerResult + Send + Sync + 'static,
    {
        self.status_listeners.register(name, listener);
    }

    /// Called when a target enters UNHEALTHY
    pub fn on_failure<F>(&self, name: &str, listener: F)
    where
        F: Fn(&StatusChange) -> ListenerResult + Send + Sync + 'static,
    {
        self.failure_listeners.register(name, listener);
    }

    /// Called when a target enters HEALTHY
    pub fn on_recovery<F>(&self, name: &str, listener: F)
    where
        F: Fn(&StatusChange) -> ListenerResult + Send + Sync + 'static,
    {
        self.recovery_listeners.register(name, listener);
    }

    // ==================== Checks ====================

    /// Run one probe cycle over every target concurrently
    pub async fn check_now(&self) {
        self.total_checks.fetch_add(1, Ordering::Relaxed);
        let targets: Vec<Arc<dyn HealthProbe>> = self.targets.read().clone();
        join_all(targets.iter().map(|t| self.check_target(t.as_ref()))).await;
    }

    async fn check_target(&self, probe: &dyn HealthProbe) {
        let name = probe.target_name().to_string();
        let started = Instant::now();
        let outcome = probe.probe().await;
        let elapsed = started.elapsed();

        let change = {
            let mut health = self.health.write();
            let Some(record) = health.get_mut(&name) else {
                // removed while the probe was in flight
                return;
            };
            match outcome {
                Ok(report) => {
                    debug!(target_name = %name, tools = report.tool_count, "Probe succeeded");
                    record.record_success(report.tool_count, report.response_time, Utc::now())
                }
                Err(e) => {
                    self.total_failures.fetch_add(1, Ordering::Relaxed);
                    debug!(target_name = %name, error = %e, "Probe failed");
                    record.record_failure(
                        e.to_string(),
                        elapsed,
                        self.params.failure_threshold,
                        Utc::now(),
                    )
                }
            }
        };

        if let Some(change) = change {
            self.publish(&change);
        }
    }

    fn publish(&self, change: &StatusChange) {
        if change.current == HealthStatus::Unhealthy {
            warn!(target_name = %change.target, from = %change.previous, "Target is unhealthy");
        } else {
            info!(
                target_name = %change.target,
                from = %change.previous,
                to = %change.current,
                "Target status changed"
            );
        }

        self.status_listeners.notify(change);
        if change.entered_unhealthy() {
            self.failure_listeners.notify(change);
        } else if change.entered_healthy() {
            self.recovery_listeners.notify(change);
        }
    }

    // ==================== Lifecycle ====================

    /// Start the periodic loop. Returns false when it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let weak = Arc::downgrade(self);
        let period = self.params.check_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(monitor) = weak.upgrade() else { break };
                        monitor.check_now().await;
                    }
                }
            }
            debug!("Health monitor loop exited");
        });

        *task = Some(MonitorTask { cancel, handle });
        info!(interval_secs = period.as_secs_f64(), "Health monitoring started");
        true
    }

    /// Stop the periodic loop and wait for it to exit. Safe to call repeatedly.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Health monitor loop ended abnormally");
                }
            }
            info!("Health monitoring stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    // ==================== Queries ====================

    pub fn server_health(&self, name: &str) -> Option<ServerHealth> {
        self.health.read().get(name).cloned()
    }

    pub fn all_health(&self) -> Vec<ServerHealth> {
        self.health.read().values().cloned().collect()
    }

    pub fn healthy_targets(&self) -> Vec<String> {
        self.health
            .read()
            .values()
            .filter(|h| h.status == HealthStatus::Healthy)
            .map(|h| h.name.clone())
            .collect()
    }

    pub fn statistics(&self) -> MonitorStatistics {
        let servers = self.all_health();
        let uptime = Utc::now() - self.created_at;
        MonitorStatistics {
            uptime_secs: uptime.num_milliseconds().max(0) as f64 / 1000.0,
            running: self.is_running(),
            total_checks: self.total_checks.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            servers_monitored: servers.len(),
            healthy_servers: servers
                .iter()
                .filter(|h| h.status == HealthStatus::Healthy)
                .count(),
            check_interval_secs: self.params.check_interval.as_secs_f64(),
            failure_threshold: self.params.failure_threshold,
            servers,
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::remote_tools::{ProbeReport, RemoteFailure};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Probe that replays scripted outcomes; the last one repeats
    struct MockProbe {
        name: String,
        script: Mutex<VecDeque<Result<usize, String>>>,
        last: Mutex<Result<usize, String>>,
    }

    impl MockProbe {
        fn new(name: &str, script: Vec<Result<usize, String>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                script: Mutex::new(script.into()),
                last: Mutex::new(Ok(1)),
            })
        }
    }

    #[async_trait]
    impl HealthProbe for MockProbe {
        fn target_name(&self) -> &str {
            &self.name
        }

        fn target_url(&self) -> &str {
            "http://mock"
        }

        async fn probe(&self) -> Result<ProbeReport, RemoteFailure> {
            let next = match self.script.lock().pop_front() {
                Some(next) => {
                    *self.last.lock() = next.clone();
                    next
                }
                None => self.last.lock().clone(),
            };
            next.map(|tool_count| ProbeReport {
                tool_count,
                response_time: Duration::from_millis(5),
            })
            .map_err(RemoteFailure::new)
        }
    }

    fn recorder(
        monitor: &HealthMonitor,
    ) -> Arc<Mutex<Vec<String>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let e = events.clone();
        monitor.on_status_change("status", move |c| {
            e.lock().push(format!("status:{}->{}", c.previous, c.current));
            Ok(())
        });
        let e = events.clone();
        monitor.on_failure("failure", move |c| {
            e.lock().push(format!("failure:{}", c.target));
            Ok(())
        });
        let e = events.clone();
        monitor.on_recovery("recovery", move |c| {
            e.lock().push(format!("recovery:{}", c.target));
            Ok(())
        });
        events
    }

    #[tokio::test]
    async fn test_failures_reach_unhealthy_at_threshold() {
        let monitor = HealthMonitor::new(MonitorParams::default().with_failure_threshold(3));
        monitor.add_target(MockProbe::new(
            "primary",
            vec![Err("connection refused".into())],
        ));
        let events = recorder(&monitor);

        monitor.check_now().await;
        assert_eq!(monitor.server_health("primary").unwrap().status, HealthStatus::Degraded);
        monitor.check_now().await;
        assert_eq!(monitor.server_health("primary").unwrap().consecutive_failures, 2);
        monitor.check_now().await;

        let health = monitor.server_health("primary").unwrap();
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.error_message.as_deref(), Some("connection refused"));
        assert_eq!(
            *events.lock(),
            vec![
                "status:unknown->degraded".to_string(),
                "status:degraded->unhealthy".to_string(),
                "failure:primary".to_string(),
            ]
        );

        let stats = monitor.statistics();
        assert_eq!(stats.total_checks, 3);
        assert_eq!(stats.total_failures, 3);
        assert_eq!(stats.healthy_servers, 0);
    }

    #[tokio::test]
    async fn test_success_resets_failures_and_fires_recovery() {
        let monitor = HealthMonitor::new(MonitorParams::default().with_failure_threshold(1));
        monitor.add_target(MockProbe::new(
            "primary",
            vec![Err("HTTP 503".into()), Ok(0), Ok(4)],
        ));
        let events = recorder(&monitor);

        monitor.check_now().await;
        monitor.check_now().await;
        let health = monitor.server_health("primary").unwrap();
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.consecutive_failures, 0);

        monitor.check_now().await;
        assert_eq!(monitor.healthy_targets(), vec!["primary".to_string()]);
        assert_eq!(
            events.lock().last().map(String::as_str),
            Some("recovery:primary")
        );
    }

    #[tokio::test]
    async fn test_listener_failure_does_not_abort_cycle() {
        let monitor = HealthMonitor::new(MonitorParams::default());
        monitor.add_target(MockProbe::new("a", vec![Ok(1)]));
        monitor.add_target(MockProbe::new("b", vec![Ok(2)]));
        monitor.on_status_change("broken", |_| panic!("listener bug"));
        let events = recorder(&monitor);

        monitor.check_now().await;

        assert_eq!(monitor.healthy_targets().len(), 2);
        assert_eq!(
            events
                .lock()
                .iter()
                .filter(|e| e.starts_with("recovery:"))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_remove_target() {
        let monitor = HealthMonitor::new(MonitorParams::default());
        monitor.add_target(MockProbe::new("primary", vec![]));
        assert!(monitor.remove_target("primary"));
        assert!(!monitor.remove_target("primary"));
        monitor.check_now().await;
        assert!(monitor.server_health("primary").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_idempotent() {
        let monitor = Arc::new(HealthMonitor::new(
            MonitorParams::default().with_check_interval(Duration::from_secs(30)),
        ));
        monitor.add_target(MockProbe::new("primary", vec![]));

        assert!(monitor.start());
        assert!(!monitor.start());
        assert!(monitor.is_running());

        tokio::time::sleep(Duration::from_secs(65)).await;
        let checks = monitor.statistics().total_checks;
        assert!(checks >= 2, "expected periodic checks, got {}", checks);

        monitor.stop().await;
        monitor.stop().await;
        assert!(!monitor.is_running());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(monitor.statistics().total_checks, checks);

        // restart after stop
        assert!(monitor.start());
        monitor.stop().await;
    }
}
