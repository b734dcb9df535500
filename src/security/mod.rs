//! Client admission subsystem.
//!
//! # Responsibilities
//! - Throttle connection attempts per client (fixed-window rate limiting)
//! - Map client organizations to the upstream group they may reach
//!
//! # Design Decisions
//! - Rate limiting keys on the certificate CommonName, not the peer IP;
//!   identity survives NAT and proxies
//! - Fixed windows admit bursts at window edges; accepted, a token bucket
//!   is a possible future replacement
//! - The access table is static and case-sensitive; unknown organizations
//!   are rejected outright

pub mod access_control;
pub mod rate_limit;

pub use access_control::AccessTable;
pub use rate_limit::{RateLimiter, SweeperHandle};
