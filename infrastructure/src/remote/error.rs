//! Error types for the remote tool client

use thiserror::Error;
use toolguard_application::RemoteFailure;
use toolguard_domain::{ErrorType, classify};

/// Result type alias for remote operations
pub type Result<T> = std::result::Result<T, RemoteError>;

/// Errors that can occur when talking to the remote tool service
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("JSON-RPC error (code {code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Failed to build connection pool: {0}")]
    PoolInit(String),
}

impl RemoteError {
    /// Server errors and transport failures are worth another attempt;
    /// client errors are not
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Http { status, .. } => *status >= 500,
            RemoteError::Connection(_) | RemoteError::Timeout(_) => true,
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            RemoteError::Connection(_) | RemoteError::PoolClosed | RemoteError::PoolInit(_) => {
                ErrorType::Connection
            }
            RemoteError::Timeout(_) => ErrorType::Timeout,
            RemoteError::Http { status: 429, .. } => ErrorType::RateLimit,
            RemoteError::Http { status: 401 | 403, .. } => ErrorType::Auth,
            RemoteError::Http { status, .. } if *status >= 500 => ErrorType::Server,
            RemoteError::Http { .. } | RemoteError::Rpc { .. } => classify(&self.to_string()),
            RemoteError::InvalidResponse(_) => ErrorType::Unknown,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RemoteError::Timeout(e.to_string())
        } else {
            RemoteError::Connection(e.to_string())
        }
    }
}

impl From<RemoteError> for RemoteFailure {
    fn from(e: RemoteError) -> Self {
        RemoteFailure {
            message: e.to_string(),
            error_type: e.error_type(),
            status: e.status(),
            retries: 0,
        }
    }
}
