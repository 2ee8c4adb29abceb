//! Gixat Observability
//!
//! This crate provides:
//! - Metrics collection (Prometheus)
//! - Health endpoints (`/healthz`, `/readyz`, `/metrics`)

pub mod health;
pub mod metrics;

pub use health::{ComponentStatus, HealthState, ReadinessChecker, health_router};
pub use metrics::Metrics;
