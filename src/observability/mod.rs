//! Observability.
//!
//! # Responsibilities
//! - Initialize structured logging (tracing, EnvFilter)
//! - Expose Prometheus metrics for sessions and rejections

pub mod logging;
pub mod metrics;
