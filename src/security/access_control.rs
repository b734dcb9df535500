//! Organization-based access control.

use std::collections::HashMap;

use crate::config::AccessConfig;

/// Static mapping from client organization to the upstream group it may
/// reach. Loaded once at startup; lookups are exact and case-sensitive.
#[derive(Debug, Clone)]
pub struct AccessTable {
    table: HashMap<String, String>,
}

impl AccessTable {
    /// Build the table from configuration.
    pub fn from_config(config: &AccessConfig) -> Self {
        Self {
            table: config.table.clone(),
        }
    }

    /// Resolve the upstream group for a client organization. `None` means
    /// the organization is not authorized.
    pub fn authorize(&self, client_org: &str) -> Option<&str> {
        self.table.get(client_org).map(String::as_str)
    }

    /// Number of authorized organizations.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
