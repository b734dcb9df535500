//! Mutual-TLS terminating L4 reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//! Client ──TLS──▶ net::listener ──▶ net::connection (one task per socket)
//!                                       │ identity  (certificate CN / O)
//!                                       │ security  (rate limit, access table)
//!                                       │ load_balancer (least-connection pick)
//!                                       ▼
//!                                   upstream TCP ◀──splice──▶ client
//!
//! Cross-cutting: config, lifecycle (signals, shutdown), observability
//! ```
//!
//! The proxy parses nothing above the transport layer; bytes flow opaquely
//! between the client and the selected upstream.

// Core subsystems
pub mod config;
pub mod net;
pub mod server;

// Traffic management
pub mod load_balancer;
pub mod security;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ProxyConfig;
pub use lifecycle::DrainController;
pub use server::ProxyServer;
