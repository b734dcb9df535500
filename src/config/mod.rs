//! Configuration subsystem.
//!
//! # Responsibilities
//! - Define the configuration schema (TOML, serde)
//! - Load configuration from disk at startup
//! - Validate semantic correctness before any subsystem starts
//!
//! # Design Decisions
//! - Configuration is read once; there is no hot reload
//! - Validation errors are aggregated so one run reports every problem
//! - Any validation failure is fatal at startup

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AccessConfig, ListenerConfig, ObservabilityConfig, ProxyConfig, RateLimitConfig,
    TimeoutConfig, TlsConfig, UpstreamConfig,
};
