//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Upstream server definitions, grouped by label.
    pub upstreams: Vec<UpstreamConfig>,

    /// Client organization to upstream group mapping.
    pub access: AccessConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8443").
    pub bind_address: String,

    /// TLS material for the listener.
    pub tls: TlsConfig,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8443".to_string(),
            tls: TlsConfig::default(),
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for the listener.
///
/// Client certificates are mandatory: the listener rejects any handshake
/// that does not present a certificate signed by `client_ca_path`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to the server certificate chain (PEM).
    pub cert_path: String,

    /// Path to the server private key (PEM).
    pub key_path: String,

    /// Path to the CA bundle used to verify client certificates (PEM).
    pub client_ca_path: String,
}

/// A single upstream server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Group this upstream belongs to. Groups are the authorization unit.
    pub group: String,

    /// Upstream address (e.g., "127.0.0.1:9001").
    pub address: String,
}

/// Authorization table: client certificate Organization -> upstream group.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AccessConfig {
    /// Exact, case-sensitive mapping. Organizations not listed are rejected.
    pub table: HashMap<String, String>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum admitted connections per client per window.
    pub limit: u32,

    /// Window duration in milliseconds.
    pub window_ms: u64,

    /// Sweeper interval in milliseconds. Must be >= window_ms.
    pub sweep_interval_ms: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            window_ms: 60_000,
            sweep_interval_ms: 60_000,
        }
    }
}

/// Timeout configuration for connection establishment and shutdown.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TLS handshake timeout in seconds.
    pub handshake_secs: u64,

    /// Upstream dial timeout in seconds.
    pub dial_secs: u64,

    /// Drain window on shutdown in seconds.
    pub drain_secs: u64,
}

impl TimeoutConfig {
    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_secs)
    }

    pub fn dial(&self) -> Duration {
        Duration::from_secs(self.dial_secs)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            handshake_secs: 5,
            dial_secs: 5,
            drain_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
