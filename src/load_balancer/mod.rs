//! Least-connection load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Client authorized → group label identified
//!     → pool.rs (pick: scan group members under the group lock,
//!                choose the member with the fewest active sessions,
//!                increment its counter in the same critical section)
//!     → upstream.rs (guard decrements the counter exactly once on drop)
//! ```
//!
//! # Design Decisions
//! - Selection and counter increment share one critical section per group,
//!   so two concurrent picks cannot both claim the same minimum
//! - Ties resolve to the lowest insertion index (deterministic, testable)
//! - Groups are small (<= 10 members); a linear scan beats any ordered
//!   structure at that size
//! - The pool is immutable after construction; only the counters change

pub mod pool;
pub mod upstream;

pub use pool::{PickError, UpstreamPool};
pub use upstream::{Upstream, UpstreamGuard};
