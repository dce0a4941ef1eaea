//! Resilience rules: failure gating, error taxonomy and recovery plans.
//!
//! - [`circuit_breaker::CircuitBreaker`]: CLOSED / OPEN / HALF_OPEN gate per tool
//! - [`error_type::ErrorType`]: closed error taxonomy with ordered classification
//! - [`recovery::RecoveryPlan`]: static plan per error type

pub mod circuit_breaker;
pub mod error_type;
pub mod recovery;
