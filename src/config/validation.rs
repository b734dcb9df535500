//! Configuration validation logic.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// Maximum members per upstream group. The selector scans the group linearly
/// under a lock, so membership is kept small.
pub const MAX_GROUP_SIZE: usize = 10;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a ProxyConfig for semantic correctness.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // 1. There must be something to forward to.
    if config.upstreams.is_empty() {
        errors.push(ValidationError("at least one upstream is required".to_string()));
    }

    // 2. Upstream addresses must parse; group sizes are bounded.
    let mut group_sizes: HashMap<&str, usize> = HashMap::new();
    for upstream in &config.upstreams {
        if upstream.address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError(format!(
                "upstream address '{}' in group '{}' is not a valid socket address",
                upstream.address, upstream.group
            )));
        }
        *group_sizes.entry(upstream.group.as_str()).or_default() += 1;
    }
    for (group, size) in &group_sizes {
        if *size > MAX_GROUP_SIZE {
            errors.push(ValidationError(format!(
                "group '{}' has {} members, maximum is {}",
                group, size, MAX_GROUP_SIZE
            )));
        }
    }

    // 3. Referential integrity: the access table must point at existing groups.
    let groups: HashSet<&str> = config.upstreams.iter().map(|u| u.group.as_str()).collect();
    for (org, group) in &config.access.table {
        if !groups.contains(group.as_str()) {
            errors.push(ValidationError(format!(
                "access table maps organization '{}' to unknown group '{}'",
                org, group
            )));
        }
    }

    // 4. Rate limiter parameters.
    if config.rate_limit.limit == 0 {
        errors.push(ValidationError("rate_limit.limit must be > 0".to_string()));
    }
    if config.rate_limit.window_ms == 0 {
        errors.push(ValidationError("rate_limit.window_ms must be > 0".to_string()));
    }
    if config.rate_limit.sweep_interval_ms < config.rate_limit.window_ms {
        errors.push(ValidationError(
            "rate_limit.sweep_interval_ms must be >= rate_limit.window_ms".to_string(),
        ));
    }

    // 5. Timeouts.
    if config.timeouts.handshake_secs == 0 {
        errors.push(ValidationError("timeouts.handshake_secs must be > 0".to_string()));
    }
    if config.timeouts.dial_secs == 0 {
        errors.push(ValidationError("timeouts.dial_secs must be > 0".to_string()));
    }

    // 6. TLS material paths.
    if config.listener.tls.cert_path.is_empty() {
        errors.push(ValidationError("listener.tls.cert_path is required".to_string()));
    }
    if config.listener.tls.key_path.is_empty() {
        errors.push(ValidationError("listener.tls.key_path is required".to_string()));
    }
    if config.listener.tls.client_ca_path.is_empty() {
        errors.push(ValidationError("listener.tls.client_ca_path is required".to_string()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::*;

    fn base_config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.listener.tls.cert_path = "certs/server.pem".into();
        config.listener.tls.key_path = "certs/server.key".into();
        config.listener.tls.client_ca_path = "certs/ca.pem".into();
        config.upstreams.push(UpstreamConfig {
            group: "groupA".into(),
            address: "127.0.0.1:9001".into(),
        });
        config
            .access
            .table
            .insert("orgA".into(), "groupA".into());
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_unknown_group_in_access_table() {
        let mut config = base_config();
        config
            .access
            .table
            .insert("orgB".into(), "missing".into());

        let errs = validate_config(&config).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(errs[0].0.contains("unknown group 'missing'"));
    }

    #[test]
    fn test_group_size_limit() {
        let mut config = base_config();
        for i in 0..MAX_GROUP_SIZE {
            config.upstreams.push(UpstreamConfig {
                group: "groupA".into(),
                address: format!("127.0.0.1:91{:02}", i),
            });
        }

        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| e.0.contains("maximum is 10")));
    }

    #[test]
    fn test_bad_upstream_address() {
        let mut config = base_config();
        config.upstreams.push(UpstreamConfig {
            group: "groupA".into(),
            address: "not-an-address".into(),
        });

        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| e.0.contains("not-an-address")));
    }

    #[test]
    fn test_sweep_interval_below_window() {
        let mut config = base_config();
        config.rate_limit.window_ms = 1000;
        config.rate_limit.sweep_interval_ms = 500;

        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| e.0.contains("sweep_interval_ms")));
    }

    #[test]
    fn test_missing_tls_paths() {
        let mut config = base_config();
        config.listener.tls.client_ca_path.clear();

        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| e.0.contains("client_ca_path")));
    }
}
