//! Resilient client for the remote tool service.
//!
//! [`ResilientClient`] wraps a [`ConnectionPool`] and a [`ToolCache`] and
//! implements both [`RemoteToolPort`] and [`HealthProbe`]:
//!
//! ```text
//! invoke_tool(call)
//!   ├─ cache hit?  ──────────────────────────► cached payload (metrics untouched)
//!   ├─ metrics.record_execution (once)
//!   └─ attempt 1..=max_retries
//!        ├─ POST invoke_path (JSON-RPC)  ─ ok ─► flatten, cache, record_success
//!        ├─ 5xx / transport error ─► sleep retry_delay × attempt, next attempt
//!        └─ 4xx / RPC error ───────► fail now
//! ```
//!
//! Failures come back as [`RemoteFailure`] values carrying the error type of
//! the last attempt and the number of retries spent.

use super::cache::ToolCache;
use super::error::RemoteError;
use super::pool::ConnectionPool;
use super::protocol::{JsonRpcRequest, flatten_response, parse_manifest};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use toolguard_application::{HealthProbe, ProbeReport, RemoteFailure, RemoteResponse, RemoteToolPort};
use toolguard_domain::{ToolCall, ToolDefinition, ToolMetrics};
use tracing::{debug, error, info, warn};

/// Connection settings for one remote target
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSettings {
    pub name: String,
    pub base_url: String,
    pub manifest_path: String,
    pub invoke_path: String,
    /// Attempts per call (and per manifest load)
    pub max_retries: u32,
    /// Linear backoff unit: attempt `n` waits `retry_delay × n`
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub pool_size: usize,
    pub keepalive: usize,
    pub cache_ttl: Duration,
    pub cache_sweep_interval: Duration,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            name: "primary".to_string(),
            base_url: "http://localhost:8000".to_string(),
            manifest_path: "/api/toolset".to_string(),
            invoke_path: "/mcp".to_string(),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
            pool_size: 10,
            keepalive: 5,
            cache_ttl: Duration::from_secs(300),
            cache_sweep_interval: Duration::from_secs(60),
        }
    }
}

impl RemoteSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Lifecycle of the client's link to the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

struct Sweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// HTTP/JSON-RPC client with pooling, retries, caching and per-tool metrics
pub struct ResilientClient {
    settings: RemoteSettings,
    pool: ConnectionPool,
    cache: Arc<ToolCache>,
    tools: RwLock<Vec<ToolDefinition>>,
    metrics: Mutex<BTreeMap<String, ToolMetrics>>,
    state: Mutex<ConnectionState>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl ResilientClient {
    /// Build the client and its connection pool. A pool that cannot be
    /// constructed is fatal.
    pub fn new(settings: RemoteSettings) -> Result<Self, RemoteError> {
        let pool = ConnectionPool::new(settings.pool_size, settings.timeout, settings.keepalive)?;
        let cache = Arc::new(ToolCache::new(settings.cache_ttl));
        Ok(Self {
            settings,
            pool,
            cache,
            tools: RwLock::new(Vec::new()),
            metrics: Mutex::new(BTreeMap::new()),
            state: Mutex::new(ConnectionState::Disconnected),
            sweeper: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &RemoteSettings {
        &self.settings
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.lock(), next);
        if previous != next {
            info!(target_name = %self.settings.name, "Connection state: {} -> {}", previous, next);
        }
    }

    fn start_sweeper(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let handle = self
            .cache
            .spawn_sweeper(self.settings.cache_sweep_interval, cancel.clone());
        *sweeper = Some(Sweeper { cancel, handle });
    }

    // ==================== Wire calls ====================

    async fn fetch_manifest(&self) -> Result<Value, RemoteError> {
        let client = self.pool.acquire()?;
        let response = client
            .get(self.settings.url(&self.settings.manifest_path))
            .send()
            .await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Http {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    async fn call_once(&self, call: &ToolCall) -> Result<Value, RemoteError> {
        let client = self.pool.acquire()?;
        let request = JsonRpcRequest::tools_call(&call.tool_name, call.arguments());
        let response = client
            .post(self.settings.url(&self.settings.invoke_path))
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Http {
                status: status.as_u16(),
                body,
            });
        }
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        flatten_response(body)
    }

    /// GET the manifest and report how many tools it lists
    pub async fn probe_manifest(&self) -> Result<ProbeReport, RemoteFailure> {
        let started = Instant::now();
        match self.fetch_manifest().await {
            Ok(body) => Ok(ProbeReport {
                tool_count: parse_manifest(&body).len(),
                response_time: started.elapsed(),
            }),
            Err(e) => {
                debug!(target_name = %self.settings.name, error = %e, "Probe failed");
                Err(e.into())
            }
        }
    }

    fn record_metrics(&self, tool: &str, f: impl FnOnce(&mut ToolMetrics)) {
        let mut metrics = self.metrics.lock();
        let entry = metrics
            .entry(tool.to_string())
            .or_insert_with(|| ToolMetrics::new(tool));
        f(entry);
    }
}

#[async_trait]
impl RemoteToolPort for ResilientClient {
    fn target_name(&self) -> &str {
        &self.settings.name
    }

    async fn initialize(&self) -> bool {
        self.set_state(ConnectionState::Connecting);
        let loaded = self.load_tools().await;
        self.set_state(if loaded {
            ConnectionState::Connected
        } else {
            ConnectionState::Error
        });
        self.start_sweeper();
        loaded
    }

    async fn load_tools(&self) -> bool {
        let attempts = self.settings.max_retries.max(1);
        for attempt in 1..=attempts {
            match self.fetch_manifest().await {
                Ok(body) => {
                    let tools = parse_manifest(&body);
                    {
                        let mut metrics = self.metrics.lock();
                        for tool in &tools {
                            metrics
                                .entry(tool.name.clone())
                                .or_insert_with(|| ToolMetrics::new(&tool.name));
                        }
                    }
                    info!(target_name = %self.settings.name, count = tools.len(), "Loaded tool manifest");
                    *self.tools.write() = tools;
                    return true;
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.settings.retry_delay * attempt;
                    warn!(attempt, error = %e, ?delay, "Manifest fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Could not load tool manifest");
                    return false;
                }
            }
        }
        false
    }

    fn available_tools(&self) -> Vec<ToolDefinition> {
        self.tools.read().clone()
    }

    async fn invoke_tool(&self, call: &ToolCall, use_cache: bool) -> Result<RemoteResponse, RemoteFailure> {
        let key = call.cache_key();
        if use_cache && let Some(payload) = self.cache.get(&key) {
            debug!(tool = %call.tool_name, "Cache hit");
            return Ok(RemoteResponse::new(payload).cached());
        }

        self.record_metrics(&call.tool_name, |m| m.record_execution(Utc::now()));
        let started = Instant::now();
        let attempts = self.settings.max_retries.max(1);

        let mut attempt = 1;
        let last_error = loop {
            debug!(tool = %call.tool_name, attempt, "Invoking remote tool");
            match self.call_once(call).await {
                Ok(payload) => {
                    let elapsed = started.elapsed();
                    self.record_metrics(&call.tool_name, |m| m.record_success(elapsed));
                    if use_cache {
                        self.cache.insert(key, payload.clone());
                    }
                    return Ok(RemoteResponse::new(payload).with_retries(attempt - 1));
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.settings.retry_delay * attempt;
                    warn!(tool = %call.tool_name, attempt, error = %e, ?delay, "Remote call failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => break e,
            }
        };

        let message = if last_error.is_retryable() {
            format!("Failed after {} attempts: {}", attempt, last_error)
        } else {
            last_error.to_string()
        };
        error!(tool = %call.tool_name, attempts = attempt, error = %last_error, "Remote call failed");
        self.record_metrics(&call.tool_name, |m| m.record_failure(message.clone()));

        Err(RemoteFailure {
            message,
            error_type: last_error.error_type(),
            status: last_error.status(),
            retries: attempt - 1,
        })
    }

    async fn probe(&self) -> Result<ProbeReport, RemoteFailure> {
        self.probe_manifest().await
    }

    fn tool_metrics(&self) -> Vec<ToolMetrics> {
        self.metrics.lock().values().cloned().collect()
    }

    async fn shutdown(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.cancel.cancel();
            if let Err(e) = sweeper.handle.await {
                warn!(error = %e, "Cache sweeper ended abnormally");
            }
        }
        self.pool.shutdown();
        self.cache.clear();
        self.set_state(ConnectionState::Disconnected);
    }
}

#[async_trait]
impl HealthProbe for ResilientClient {
    fn target_name(&self) -> &str {
        &self.settings.name
    }

    fn target_url(&self) -> &str {
        &self.settings.base_url
    }

    async fn probe(&self) -> Result<ProbeReport, RemoteFailure> {
        self.probe_manifest().await
    }
}
