//! Error taxonomy and classification.
//!
//! Raw failure text is mapped to exactly one [`ErrorType`]. Rules are tried
//! in the order of [`CLASSIFICATION_RULES`]; the first rule with a matching
//! term wins, anything else is [`ErrorType::Unknown`].

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Connection,
    Timeout,
    Validation,
    RateLimit,
    Auth,
    Server,
    Unknown,
}

/// Ordered classification table (precedence is significant)
pub const CLASSIFICATION_RULES: [(ErrorType, &[&str]); 6] = [
    (ErrorType::Connection, &["connection", "connect", "network"]),
    (ErrorType::Timeout, &["timeout", "timed out"]),
    (ErrorType::Validation, &["validation", "invalid", "missing required"]),
    (ErrorType::RateLimit, &["rate limit", "too many requests", "429"]),
    (ErrorType::Auth, &["unauthorized", "authentication", "401", "403"]),
    (ErrorType::Server, &["server error", "500", "502", "503"]),
];

/// Classify raw error text
pub fn classify(message: &str) -> ErrorType {
    let lowered = message.to_lowercase();
    CLASSIFICATION_RULES
        .iter()
        .find(|(_, terms)| terms.iter().any(|term| lowered.contains(term)))
        .map(|(error_type, _)| *error_type)
        .unwrap_or(ErrorType::Unknown)
}

impl ErrorType {
    pub const ALL: [ErrorType; 7] = [
        ErrorType::Connection,
        ErrorType::Timeout,
        ErrorType::Validation,
        ErrorType::RateLimit,
        ErrorType::Auth,
        ErrorType::Server,
        ErrorType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Connection => "connection",
            ErrorType::Timeout => "timeout",
            ErrorType::Validation => "validation",
            ErrorType::RateLimit => "rate_limit",
            ErrorType::Auth => "auth",
            ErrorType::Server => "server",
            ErrorType::Unknown => "unknown",
        }
    }

    /// How many attempts the orchestrator's own backoff loop makes on the
    /// primary path before handing this error to the recovery planner.
    ///
    /// | Type | Attempts |
    /// |------|----------|
    /// | Validation, Server, RateLimit | 1 |
    /// | Auth | 2 |
    /// | Connection, Timeout, Unknown | `configured` |
    pub fn primary_attempt_budget(&self, configured: u32) -> u32 {
        let budget = match self {
            ErrorType::Validation | ErrorType::Server | ErrorType::RateLimit => 1,
            ErrorType::Auth => 2,
            ErrorType::Connection | ErrorType::Timeout | ErrorType::Unknown => configured,
        };
        budget.min(configured).max(1)
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ErrorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("Invalid ErrorType: {}", s))
    }
}
