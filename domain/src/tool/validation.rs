//! Declarative parameter validation for known tools.
//!
//! Each known tool has a [`ToolSchema`]: which parameters are required, which
//! are optional (with defaults), the expected [`ParamKind`] and an optional
//! [`Constraint`]. [`ParameterValidator::validate`] applies them:
//!
//! 1. Supplied values are converted to their kind and checked against
//!    their constraint, in schema order
//! 2. Missing required parameters are reported
//! 3. Missing optional parameters receive their defaults
//! 4. Parameters the schema does not know are kept and reported as warnings
//!
//! Unknown tools pass through unchanged.

use crate::sales;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Validation failure, naming the first offending parameter.
///
/// The messages contain "missing required" or "invalid", which is what
/// error classification keys on for `VALIDATION`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required parameter '{parameter}' for tool '{tool}'")]
    MissingParameter { tool: String, parameter: String },

    #[error("Invalid type for parameter '{parameter}' of tool '{tool}': expected {expected}")]
    InvalidType {
        tool: String,
        parameter: String,
        expected: ParamKind,
    },

    #[error("Invalid value for parameter '{parameter}' of tool '{tool}': {constraint}")]
    ConstraintViolated {
        tool: String,
        parameter: String,
        constraint: String,
    },
}

impl ValidationError {
    pub fn parameter(&self) -> &str {
        match self {
            ValidationError::MissingParameter { parameter, .. }
            | ValidationError::InvalidType { parameter, .. }
            | ValidationError::ConstraintViolated { parameter, .. } => parameter,
        }
    }
}

/// Expected value kind of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    Float,
    String,
    Boolean,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Integer => "integer",
            ParamKind::Float => "number",
            ParamKind::String => "string",
            ParamKind::Boolean => "boolean",
        }
    }

    /// Convert a supplied value to this kind, if it can be converted losslessly
    fn convert(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (ParamKind::Integer, Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(Value::from),
            (ParamKind::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (ParamKind::Float, Value::Number(n)) => n.as_f64().map(Value::from),
            (ParamKind::Float, Value::String(s)) => s.trim().parse::<f64>().ok().map(Value::from),
            (ParamKind::String, Value::String(_)) => Some(value.clone()),
            (ParamKind::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (ParamKind::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (ParamKind::Boolean, Value::Bool(_)) => Some(value.clone()),
            (ParamKind::Boolean, Value::String(s)) => match s.to_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Predicate on a converted parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Integer strictly greater than zero
    Positive,
    /// Integer greater than or equal to the bound
    AtLeast(i64),
    /// Integer within the inclusive range
    Between(i64, i64),
    /// String equal to one of the listed values
    OneOf(Vec<&'static str>),
    /// String that is not blank
    NonEmpty,
    /// String in one of the accepted date shapes
    IsoDate,
}

impl Constraint {
    fn check(&self, value: &Value) -> bool {
        match self {
            Constraint::Positive => value.as_i64().is_some_and(|n| n > 0),
            Constraint::AtLeast(min) => value.as_i64().is_some_and(|n| n >= *min),
            Constraint::Between(lo, hi) => value.as_i64().is_some_and(|n| (*lo..=*hi).contains(&n)),
            Constraint::OneOf(allowed) => value
                .as_str()
                .is_some_and(|s| allowed.iter().any(|a| *a == s)),
            Constraint::NonEmpty => value.as_str().is_some_and(|s| !s.trim().is_empty()),
            Constraint::IsoDate => value
                .as_str()
                .is_some_and(|s| sales::parse_flexible(s).is_some()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Constraint::Positive => "must be greater than 0".to_string(),
            Constraint::AtLeast(min) => format!("must be >= {}", min),
            Constraint::Between(lo, hi) => format!("must be between {} and {}", lo, hi),
            Constraint::OneOf(allowed) => format!("must be one of: {}", allowed.join(", ")),
            Constraint::NonEmpty => "must not be empty".to_string(),
            Constraint::IsoDate => {
                "must be a date (YYYY-MM-DD, YYYY-MM-DD HH:MM:SS or YYYY-MM-DDTHH:MM:SSZ)"
                    .to_string()
            }
        }
    }
}

/// Default for an optional parameter
#[derive(Debug, Clone)]
pub enum ParamDefault {
    Value(Value),
    /// Computed from the validation time
    Computed(fn(DateTime<Utc>) -> Value),
}

impl ParamDefault {
    fn resolve(&self, now: DateTime<Utc>) -> Value {
        match self {
            ParamDefault::Value(v) => v.clone(),
            ParamDefault::Computed(f) => f(now),
        }
    }
}

/// Rule for one parameter
#[derive(Debug, Clone)]
pub struct ParamRule {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<ParamDefault>,
    pub constraint: Option<Constraint>,
}

impl ParamRule {
    pub fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
            constraint: None,
        }
    }

    pub fn optional(name: &'static str, kind: ParamKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(ParamDefault::Value(value.into()));
        self
    }

    pub fn with_computed_default(mut self, f: fn(DateTime<Utc>) -> Value) -> Self {
        self.default = Some(ParamDefault::Computed(f));
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }
}

/// Parameter schema of one tool
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub tool: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamRule>,
}

impl ToolSchema {
    pub fn new(tool: &'static str, description: &'static str) -> Self {
        Self {
            tool,
            description,
            params: Vec::new(),
        }
    }

    pub fn param(mut self, rule: ParamRule) -> Self {
        self.params.push(rule);
        self
    }

    /// JSON description of the schema
    pub fn describe(&self) -> Value {
        let params: Vec<Value> = self
            .params
            .iter()
            .map(|rule| {
                json!({
                    "name": rule.name,
                    "type": rule.kind.as_str(),
                    "required": rule.required,
                    "has_default": rule.default.is_some(),
                    "constraint": rule.constraint.as_ref().map(Constraint::describe),
                })
            })
            .collect();
        json!({
            "name": self.tool,
            "description": self.description,
            "parameters": params,
        })
    }
}

/// Parameters after validation, with defaults applied
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedParams {
    pub params: BTreeMap<String, Value>,
    /// Parameters the schema does not know about
    pub warnings: Vec<String>,
}

/// Order statuses accepted by `update_order_status`
pub const ORDER_STATUSES: [&str; 4] = ["pending", "paid", "shipped", "cancelled"];

fn sales_window_start(now: DateTime<Utc>) -> Value {
    Value::String(sales::format_iso(sales::trailing_window(now).0))
}

fn sales_window_end(now: DateTime<Utc>) -> Value {
    Value::String(sales::format_iso(sales::trailing_window(now).1))
}

/// Schema-driven validator, preloaded with the built-in tool schemas
#[derive(Debug, Clone)]
pub struct ParameterValidator {
    schemas: HashMap<&'static str, ToolSchema>,
}

impl Default for ParameterValidator {
    fn default() -> Self {
        Self::empty()
            .register(
                ToolSchema::new("search_customers", "Search customers by name")
                    .param(ParamRule::optional("name_pattern", ParamKind::String).with_default("%"))
                    .param(
                        ParamRule::optional("limit", ParamKind::Integer)
                            .with_default(10)
                            .with_constraint(Constraint::Between(1, 1000)),
                    ),
            )
            .register(
                ToolSchema::new("get_customer_orders", "Orders and line items for a customer").param(
                    ParamRule::required("customer_id", ParamKind::Integer)
                        .with_constraint(Constraint::Positive),
                ),
            )
            .register(
                ToolSchema::new(
                    "get_customer_value_by_status",
                    "Total order value per status for a customer",
                )
                .param(
                    ParamRule::required("customer_id", ParamKind::Integer)
                        .with_constraint(Constraint::Positive),
                ),
            )
            .register(ToolSchema::new("list_products", "List all products"))
            .register(
                ToolSchema::new("create_order", "Create an order for a customer").param(
                    ParamRule::required("customer_id", ParamKind::Integer)
                        .with_constraint(Constraint::Positive),
                ),
            )
            .register(
                ToolSchema::new("add_order_item", "Add a product to an order")
                    .param(
                        ParamRule::required("order_id", ParamKind::Integer)
                            .with_constraint(Constraint::Positive),
                    )
                    .param(
                        ParamRule::required("product_id", ParamKind::Integer)
                            .with_constraint(Constraint::Positive),
                    )
                    .param(
                        ParamRule::required("quantity", ParamKind::Integer)
                            .with_constraint(Constraint::AtLeast(1)),
                    ),
            )
            .register(
                ToolSchema::new("update_order_status", "Change the status of an order")
                    .param(
                        ParamRule::required("order_id", ParamKind::Integer)
                            .with_constraint(Constraint::Positive),
                    )
                    .param(
                        ParamRule::required("new_status", ParamKind::String)
                            .with_constraint(Constraint::OneOf(ORDER_STATUSES.to_vec())),
                    ),
            )
            .register(
                ToolSchema::new("sales_by_month", "Monthly sales totals over a date window")
                    .param(
                        ParamRule::optional("start_date", ParamKind::String)
                            .with_computed_default(sales_window_start)
                            .with_constraint(Constraint::IsoDate),
                    )
                    .param(
                        ParamRule::optional("end_date", ParamKind::String)
                            .with_computed_default(sales_window_end)
                            .with_constraint(Constraint::IsoDate),
                    )
                    .param(ParamRule::optional("currency", ParamKind::String).with_default("VND")),
            )
            .register(
                ToolSchema::new(
                    "execute_dynamic_sql",
                    "Answer a natural language question with a read-only query",
                )
                .param(
                    ParamRule::required("natural_language_query", ParamKind::String)
                        .with_constraint(Constraint::NonEmpty),
                )
                .param(
                    ParamRule::optional("max_results", ParamKind::Integer)
                        .with_default(100)
                        .with_constraint(Constraint::Between(1, 1000)),
                ),
            )
    }
}

impl ParameterValidator {
    /// Validator without any schema (every tool passes through)
    pub fn empty() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    pub fn register(mut self, schema: ToolSchema) -> Self {
        self.schemas.insert(schema.tool, schema);
        self
    }

    pub fn schema(&self, tool: &str) -> Option<&ToolSchema> {
        self.schemas.get(tool)
    }

    /// JSON description of a tool's schema
    pub fn tool_info(&self, tool: &str) -> Option<Value> {
        self.schema(tool).map(ToolSchema::describe)
    }

    pub fn validate(
        &self,
        tool: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<ValidatedParams, ValidationError> {
        self.validate_at(tool, params, Utc::now())
    }

    /// Validate with an explicit clock for computed defaults
    pub fn validate_at(
        &self,
        tool: &str,
        params: &BTreeMap<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<ValidatedParams, ValidationError> {
        let Some(schema) = self.schemas.get(tool) else {
            return Ok(ValidatedParams {
                params: params.clone(),
                warnings: Vec::new(),
            });
        };

        let mut validated = params.clone();
        // null is treated as "not supplied"
        validated.retain(|_, v| !v.is_null());

        for rule in &schema.params {
            let Some(raw) = validated.get(rule.name) else {
                continue;
            };
            let converted = rule
                .kind
                .convert(raw)
                .ok_or_else(|| ValidationError::InvalidType {
                    tool: tool.to_string(),
                    parameter: rule.name.to_string(),
                    expected: rule.kind,
                })?;
            if let Some(constraint) = &rule.constraint
                && !constraint.check(&converted)
            {
                return Err(ValidationError::ConstraintViolated {
                    tool: tool.to_string(),
                    parameter: rule.name.to_string(),
                    constraint: constraint.describe(),
                });
            }
            validated.insert(rule.name.to_string(), converted);
        }

        if let Some(missing) = schema
            .params
            .iter()
            .find(|rule| rule.required && !validated.contains_key(rule.name))
        {
            return Err(ValidationError::MissingParameter {
                tool: tool.to_string(),
                parameter: missing.name.to_string(),
            });
        }

        for rule in &schema.params {
            if let Some(default) = &rule.default
                && !validated.contains_key(rule.name)
            {
                validated.insert(rule.name.to_string(), default.resolve(now));
            }
        }

        let warnings = validated
            .keys()
            .filter(|key| !schema.params.iter().any(|rule| rule.name == key.as_str()))
            .map(|key| format!("Unexpected parameter '{}' for tool '{}'", key, tool))
            .collect();

        Ok(ValidatedParams {
            params: validated,
            warnings,
        })
    }
}
