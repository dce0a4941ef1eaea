//! SQLite-backed local fallback executor.
//!
//! Serves a fixed set of read-only tools straight from the local store when
//! the remote service cannot be used:
//!
//! | Tool | Query |
//! |------|-------|
//! | `list_products` | all products by id |
//! | `search_customers` | case-insensitive name match, newest first |
//! | `get_customer_orders` | order lines of one customer, newest first |
//! | `get_customer_value_by_status` | order value per status |
//! | `sales_by_month` | monthly totals over a window, zero-filled |
//!
//! Every query passes the read-only guard, is bounded by a row limit and
//! runs on its own task under the query timeout.

use super::sql_guard::{enforce_limit, ensure_read_only};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::path::Path;
use std::time::Duration;
use toolguard_application::{
    DEFAULT_FALLBACK_REASON, FallbackError, FallbackPort, FallbackReason, FallbackStatus,
};
use toolguard_domain::sales::{normalize_series, parse_flexible, summarize, to_storage_format};
use toolguard_domain::{ParameterValidator, ToolCall, ValidationError};
use tracing::{debug, info, warn};

/// Tools with a local implementation
pub const FALLBACK_TOOLS: [&str; 5] = [
    "list_products",
    "search_customers",
    "get_customer_orders",
    "get_customer_value_by_status",
    "sales_by_month",
];

const LIST_PRODUCTS_SQL: &str = "\
    SELECT id, sku, name, price_cents, stock \
    FROM products \
    ORDER BY id ASC";

const SEARCH_CUSTOMERS_SQL: &str = "\
    SELECT id, name, email, created_at \
    FROM customers \
    WHERE lower(name) LIKE lower(?) \
    ORDER BY created_at DESC \
    LIMIT ?";

const CUSTOMER_ORDERS_SQL: &str = "\
    SELECT o.id AS order_id, o.status, o.created_at, \
           p.name AS product, oi.quantity, oi.price_cents \
    FROM orders o \
    JOIN order_items oi ON oi.order_id = o.id \
    JOIN products p ON p.id = oi.product_id \
    WHERE o.customer_id = ? \
    ORDER BY o.created_at DESC, o.id DESC";

const VALUE_BY_STATUS_SQL: &str = "\
    SELECT o.status, SUM(oi.quantity * oi.price_cents) AS total_value_cents \
    FROM orders o \
    JOIN order_items oi ON oi.order_id = o.id \
    WHERE o.customer_id = ? \
    GROUP BY o.status \
    ORDER BY o.status";

const SALES_BY_MONTH_SQL: &str = "\
    SELECT strftime('%Y-%m', o.created_at) AS ym, \
           SUM(oi.quantity * oi.price_cents) AS total_cents \
    FROM orders o \
    JOIN order_items oi ON oi.order_id = o.id \
    WHERE o.created_at BETWEEN ? AND ? \
    GROUP BY ym \
    ORDER BY ym";

/// Local store settings
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackSettings {
    pub database_url: String,
    /// Ceiling for a single local query
    pub query_timeout: Duration,
    /// Row bound for queries without their own LIMIT
    pub max_rows: usize,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://db.sqlite3".to_string(),
            query_timeout: Duration::from_secs(8),
            max_rows: 500,
        }
    }
}

#[derive(Debug, Clone)]
enum SqlParam {
    Int(i64),
    Text(String),
}

#[derive(Debug, Default)]
struct FallbackState {
    enabled: bool,
    reasons: Vec<FallbackReason>,
}

pub struct SqliteFallbackExecutor {
    pool: SqlitePool,
    settings: FallbackSettings,
    validator: ParameterValidator,
    state: Mutex<FallbackState>,
}

impl SqliteFallbackExecutor {
    /// Lazily connecting executor; the store is opened on first query
    pub fn connect_lazy(settings: FallbackSettings) -> Result<Self, FallbackError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(settings.query_timeout)
            .connect_lazy(&settings.database_url)
            .map_err(|e| FallbackError::Database(e.to_string()))?;
        info!(database = %settings.database_url, "Local fallback store configured");
        Ok(Self::from_pool(pool, settings))
    }

    pub fn from_pool(pool: SqlitePool, settings: FallbackSettings) -> Self {
        Self {
            pool,
            settings,
            validator: ParameterValidator::default(),
            state: Mutex::new(FallbackState::default()),
        }
    }

    pub fn with_validator(mut self, validator: ParameterValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn settings(&self) -> &FallbackSettings {
        &self.settings
    }

    /// Latest recorded reason, or the default when none was recorded
    pub fn fallback_reason(&self) -> String {
        self.state
            .lock()
            .reasons
            .last()
            .map(|r| r.reason.clone())
            .unwrap_or_else(|| DEFAULT_FALLBACK_REASON.to_string())
    }

    fn store_available(&self) -> bool {
        if self.pool.is_closed() {
            return false;
        }
        match database_path(&self.settings.database_url) {
            Some(path) => Path::new(path).exists(),
            None => true,
        }
    }

    async fn query(&self, sql: &str, params: Vec<SqlParam>) -> Result<Vec<Value>, FallbackError> {
        ensure_read_only(sql)?;
        let sql = enforce_limit(sql, self.settings.max_rows);
        let pool = self.pool.clone();

        let handle = tokio::spawn(async move {
            let mut query = sqlx::query(&sql);
            for param in params {
                query = match param {
                    SqlParam::Int(v) => query.bind(v),
                    SqlParam::Text(v) => query.bind(v),
                };
            }
            let rows = query.fetch_all(&pool).await?;
            Ok::<_, sqlx::Error>(rows.iter().map(row_to_json).collect::<Vec<_>>())
        });
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.settings.query_timeout, handle).await {
            Ok(Ok(Ok(rows))) => Ok(rows),
            Ok(Ok(Err(e))) => Err(FallbackError::Database(e.to_string())),
            Ok(Err(e)) => Err(FallbackError::Database(e.to_string())),
            Err(_) => {
                abort.abort();
                warn!(timeout = ?self.settings.query_timeout, "Local query timed out");
                Err(FallbackError::QueryTimeout(self.settings.query_timeout))
            }
        }
    }

    // ==================== Tools ====================

    async fn sales_by_month(
        &self,
        params: &std::collections::BTreeMap<String, Value>,
    ) -> Result<Value, FallbackError> {
        let boundary = |name: &str| -> Result<(String, NaiveDate), FallbackError> {
            let raw = params.get(name).and_then(Value::as_str).unwrap_or_default();
            let parsed = parse_flexible(raw).ok_or_else(|| ValidationError::ConstraintViolated {
                tool: "sales_by_month".into(),
                parameter: name.into(),
                constraint: "must be an ISO date".into(),
            })?;
            Ok((to_storage_format(raw), parsed.date()))
        };
        let (start, start_date) = boundary("start_date")?;
        let (end, end_date) = boundary("end_date")?;

        let rows = self
            .query(
                SALES_BY_MONTH_SQL,
                vec![SqlParam::Text(start), SqlParam::Text(end)],
            )
            .await?;
        let totals: Vec<(String, i64)> = rows
            .iter()
            .filter_map(|row| {
                let ym = row.get("ym")?.as_str()?.to_string();
                let total = row.get("total_cents").and_then(Value::as_i64).unwrap_or(0);
                Some((ym, total))
            })
            .collect();

        let series = normalize_series(&totals, start_date, end_date);
        let summary = summarize(&series);
        Ok(json!({
            "results": series,
            "summary": summary,
            "currency": params.get("currency").cloned().unwrap_or(Value::Null),
        }))
    }
}

/// File path behind a `sqlite:` URL, or `None` for in-memory stores
fn database_path(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = rest.split('?').next().unwrap_or(rest);
    (!path.is_empty() && !path.contains(":memory:")).then_some(path)
}

fn like_pattern(raw: Option<&str>) -> String {
    match raw {
        None | Some("") => "%".to_string(),
        Some(p) if p.starts_with('%') => p.to_string(),
        Some(p) => format!("%{}%", p),
    }
}

fn row_to_json(row: &SqliteRow) -> Value {
    let mut object = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = match row.try_get_raw(i) {
            Ok(raw) if raw.is_null() => Value::Null,
            Ok(raw) => match raw.type_info().name() {
                "INTEGER" => row.try_get::<i64, _>(i).map(Value::from).unwrap_or(Value::Null),
                "REAL" => row.try_get::<f64, _>(i).map(Value::from).unwrap_or(Value::Null),
                "BLOB" => row
                    .try_get::<Vec<u8>, _>(i)
                    .map(|b| Value::from(String::from_utf8_lossy(&b).into_owned()))
                    .unwrap_or(Value::Null),
                _ => row.try_get::<String, _>(i).map(Value::from).unwrap_or(Value::Null),
            },
            Err(_) => Value::Null,
        };
        object.insert(column.name().to_string(), value);
    }
    Value::Object(object)
}

#[async_trait]
impl FallbackPort for SqliteFallbackExecutor {
    fn supports(&self, tool_name: &str) -> bool {
        FALLBACK_TOOLS.contains(&tool_name)
    }

    fn supported_tools(&self) -> Vec<String> {
        FALLBACK_TOOLS.iter().map(|t| t.to_string()).collect()
    }

    async fn execute_fallback(&self, call: &ToolCall) -> Result<Value, FallbackError> {
        if !self.supports(&call.tool_name) {
            return Err(FallbackError::UnsupportedTool(call.tool_name.clone()));
        }
        let validated = self.validator.validate(&call.tool_name, &call.parameters)?;
        let params = &validated.params;
        let customer_id = || params.get("customer_id").and_then(Value::as_i64).unwrap_or(0);

        debug!(tool = %call.tool_name, "Executing local fallback");
        let mut payload = match call.tool_name.as_str() {
            "list_products" => json!({"results": self.query(LIST_PRODUCTS_SQL, vec![]).await?}),
            "search_customers" => {
                let pattern = like_pattern(params.get("name_pattern").and_then(Value::as_str));
                let limit = params.get("limit").and_then(Value::as_i64).unwrap_or(10);
                let rows = self
                    .query(
                        SEARCH_CUSTOMERS_SQL,
                        vec![SqlParam::Text(pattern), SqlParam::Int(limit)],
                    )
                    .await?;
                json!({"results": rows})
            }
            "get_customer_orders" => {
                let rows = self
                    .query(CUSTOMER_ORDERS_SQL, vec![SqlParam::Int(customer_id())])
                    .await?;
                json!({"results": rows})
            }
            "get_customer_value_by_status" => {
                let rows = self
                    .query(VALUE_BY_STATUS_SQL, vec![SqlParam::Int(customer_id())])
                    .await?;
                json!({"results": rows})
            }
            "sales_by_month" => self.sales_by_month(params).await?,
            other => return Err(FallbackError::UnsupportedTool(other.to_string())),
        };

        let row_count = payload["results"].as_array().map_or(0, Vec::len);
        if let Value::Object(map) = &mut payload {
            map.insert("status".into(), json!("success"));
            map.insert("row_count".into(), json!(row_count));
            map.insert("fallback".into(), json!(true));
            map.insert("fallback_reason".into(), json!(self.fallback_reason()));
        }
        Ok(payload)
    }

    fn enable_fallback(&self, reason: &str) {
        let mut state = self.state.lock();
        state.enabled = true;
        state.reasons.push(FallbackReason {
            reason: reason.to_string(),
            at: Utc::now(),
        });
        info!(reason, "Local fallback enabled");
    }

    fn disable_fallback(&self) {
        let mut state = self.state.lock();
        if state.enabled {
            info!("Local fallback disabled");
        }
        state.enabled = false;
        state.reasons.clear();
    }

    fn fallback_status(&self) -> FallbackStatus {
        let state = self.state.lock();
        FallbackStatus {
            enabled: state.enabled,
            reasons: state.reasons.clone(),
            supported_tools: self.supported_tools(),
            store: self.settings.database_url.clone(),
            store_available: self.store_available(),
        }
    }
}
