//! Upstream pool management.
//!
//! # Responsibilities
//! - Build groups of upstreams from configuration
//! - Pick the least-loaded member of a group, atomically with the
//!   counter increment
//! - Hand out guards that release the counter on drop

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::config::UpstreamConfig;
use crate::load_balancer::upstream::{Upstream, UpstreamGuard};

/// Error type for upstream selection.
///
/// `UnknownGroup` indicates a configuration bug (the authorizer produced a
/// label the pool never had), distinct from an authorization failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PickError {
    #[error("unknown upstream group '{0}'")]
    UnknownGroup(String),

    #[error("upstream group '{0}' has no members")]
    EmptyGroup(String),
}

/// An ordered group of upstreams under one label.
///
/// Member order is insertion order and never changes; it is the tie-break
/// for selection. The lock serializes every selection scan and counter
/// write within the group.
#[derive(Debug)]
struct Group {
    members: Vec<Arc<Upstream>>,
    select_lock: Arc<Mutex<()>>,
}

/// Manages upstream groups and least-connection selection.
///
/// The pool is constructed once at startup and never mutated; all mutability
/// lives in the per-upstream session counters.
#[derive(Debug)]
pub struct UpstreamPool {
    groups: HashMap<String, Group>,
}

impl UpstreamPool {
    /// Build the pool from configuration, preserving member order per group.
    pub fn from_config(configs: &[UpstreamConfig]) -> Self {
        let mut members: HashMap<String, Vec<Arc<Upstream>>> = HashMap::new();

        for config in configs {
            if let Ok(addr) = config.address.parse() {
                members
                    .entry(config.group.clone())
                    .or_default()
                    .push(Arc::new(Upstream::new(addr)));
            } else {
                tracing::warn!(
                    group = %config.group,
                    address = %config.address,
                    "Skipping upstream with invalid address"
                );
            }
        }

        let groups = members
            .into_iter()
            .map(|(label, members)| {
                tracing::debug!(group = %label, members = members.len(), "Upstream group ready");
                let group = Group {
                    members,
                    select_lock: Arc::new(Mutex::new(())),
                };
                (label, group)
            })
            .collect();

        Self { groups }
    }

    /// Pick the least-loaded upstream in the given group.
    ///
    /// The selection scan and the counter increment happen inside the same
    /// critical section, so two concurrent picks cannot both observe and
    /// claim the same minimum. Ties resolve to the lowest insertion index
    /// (`min_by_key` keeps the first minimum).
    pub fn pick(&self, label: &str) -> Result<UpstreamGuard, PickError> {
        let group = self
            .groups
            .get(label)
            .ok_or_else(|| PickError::UnknownGroup(label.to_string()))?;

        let _select = group
            .select_lock
            .lock()
            .expect("group selection lock poisoned");

        let chosen = group
            .members
            .iter()
            .min_by_key(|u| u.active_sessions())
            .ok_or_else(|| PickError::EmptyGroup(label.to_string()))?;

        chosen.begin_session();
        Ok(UpstreamGuard::new(
            chosen.clone(),
            group.select_lock.clone(),
        ))
    }

    /// Total active sessions across every group.
    pub fn total_active_sessions(&self) -> usize {
        self.groups
            .values()
            .flat_map(|g| g.members.iter())
            .map(|u| u.active_sessions())
            .sum()
    }
}
