//! Execution mode of the orchestrator.
//!
//! [`ExecutionMode`] is the routing decision taken for every tool call:
//!
//! | Mode | Route |
//! |------|-------|
//! | `Primary` | Remote service through the resilient client |
//! | `Fallback` | Local data store through the fallback executor |
//! | `Degraded` | Neither path is usable, calls fail immediately |
//! | `Recovery` | Transient, the primary path is being re-tested |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Routing mode for tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Remote service is used
    #[default]
    Primary,
    /// Local fallback executor is used
    Fallback,
    /// No execution path is available
    Degraded,
    /// Primary path is being probed before resuming it
    Recovery,
}

impl ExecutionMode {
    pub const ALL: [ExecutionMode; 4] = [
        ExecutionMode::Primary,
        ExecutionMode::Fallback,
        ExecutionMode::Degraded,
        ExecutionMode::Recovery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Primary => "primary",
            ExecutionMode::Fallback => "fallback",
            ExecutionMode::Degraded => "degraded",
            ExecutionMode::Recovery => "recovery",
        }
    }

    /// Whether calls in this mode go to the remote service first
    pub fn uses_primary(&self) -> bool {
        matches!(self, ExecutionMode::Primary | ExecutionMode::Recovery)
    }

    /// Whether this mode is a failover state that recovery can leave
    pub fn is_failover(&self) -> bool {
        matches!(self, ExecutionMode::Fallback | ExecutionMode::Degraded)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "primary" => Ok(ExecutionMode::Primary),
            "fallback" => Ok(ExecutionMode::Fallback),
            "degraded" => Ok(ExecutionMode::Degraded),
            "recovery" => Ok(ExecutionMode::Recovery),
            _ => Err(format!("Invalid ExecutionMode: {}", s)),
        }
    }
}
