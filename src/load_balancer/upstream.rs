//! Upstream abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream server
//! - Track active sessions (for least-connection selection)
//! - Guarantee counter release through an RAII guard

use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A single upstream server.
#[derive(Debug)]
pub struct Upstream {
    /// The address of the upstream.
    pub addr: SocketAddr,
    /// Number of currently active sessions.
    active_sessions: AtomicUsize,
}

impl Upstream {
    /// Create a new upstream with no active sessions.
    pub(crate) fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            active_sessions: AtomicUsize::new(0),
        }
    }

    /// Get the current number of active sessions.
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Claim a session slot. Callers must hold the owning group's
    /// selection lock.
    pub(crate) fn begin_session(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Release a session slot. Callers must hold the owning group's
    /// selection lock. Releasing more sessions than were claimed is a
    /// programmer error.
    pub(crate) fn end_session(&self) {
        let prev = self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(prev > 0, "session released on {} without a matching claim", self.addr);
    }
}

/// An RAII guard for one claimed session slot on an upstream.
///
/// Dropping the guard releases the slot exactly once, on every exit path of
/// the connection handler. The decrement takes the owning group's selection
/// lock so counter writes serialize with selection scans.
#[derive(Debug)]
pub struct UpstreamGuard {
    upstream: Arc<Upstream>,
    select_lock: Arc<Mutex<()>>,
}

impl UpstreamGuard {
    pub(crate) fn new(upstream: Arc<Upstream>, select_lock: Arc<Mutex<()>>) -> Self {
        Self {
            upstream,
            select_lock,
        }
    }
}

impl Deref for UpstreamGuard {
    type Target = Upstream;

    fn deref(&self) -> &Self::Target {
        &self.upstream
    }
}

impl Drop for UpstreamGuard {
    fn drop(&mut self) {
        // A poisoned lock must not leak the session count.
        let _select = self
            .select_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.upstream.end_session();
    }
}
