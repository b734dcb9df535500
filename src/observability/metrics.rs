//! Metrics collection and exposition.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize metrics exporter and scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus recorder");

    tracing::info!("Metrics server listening on http://{}", addr);
}

/// Record an established client-to-upstream session.
pub fn record_session_opened(group: &str) {
    counter!("proxy_sessions_total", "group" => group.to_string()).increment(1);
    gauge!("proxy_active_sessions", "group" => group.to_string()).increment(1.0);
}

/// Record the end of a session, however it ended.
pub fn record_session_closed(group: &str, duration: Duration) {
    gauge!("proxy_active_sessions", "group" => group.to_string()).decrement(1.0);
    histogram!("proxy_session_duration_seconds", "group" => group.to_string())
        .record(duration.as_secs_f64());
}

/// Record a connection that never reached an upstream.
pub fn record_rejection(reason: &'static str) {
    counter!("proxy_rejected_connections_total", "reason" => reason).increment(1);
}
