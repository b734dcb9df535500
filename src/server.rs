//! Proxy server wiring and acceptance loop.
//!
//! # Responsibilities
//! - Build every subsystem from configuration (fail fast on any error)
//! - Accept sockets and spawn one handler task per connection
//! - Coordinate graceful shutdown: stop accepting, stop the sweeper,
//!   drain in-flight handlers within the configured window

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

use crate::config::ProxyConfig;
use crate::lifecycle::DrainSignal;
use crate::load_balancer::UpstreamPool;
use crate::net::connection::{handle_connection, ProxyContext};
use crate::net::listener::Listener;
use crate::net::tls::{build_server_config, TlsError};
use crate::security::{AccessTable, RateLimiter};

/// Error type for server construction. All variants are fatal.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),
}

/// The proxy server: owns the shared handler context and the background
/// sweeper for the lifetime of the acceptance loop.
pub struct ProxyServer {
    config: ProxyConfig,
    ctx: Arc<ProxyContext>,
    limiter: Arc<RateLimiter>,
}

impl ProxyServer {
    /// Build all subsystems from configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, StartupError> {
        let tls = TlsAcceptor::from(build_server_config(&config.listener.tls)?);
        let pool = Arc::new(UpstreamPool::from_config(&config.upstreams));
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit.limit,
            config.rate_limit.window(),
        ));
        let access = AccessTable::from_config(&config.access);

        tracing::info!(
            upstreams = config.upstreams.len(),
            organizations = access.len(),
            rate_limit = config.rate_limit.limit,
            "Proxy configured"
        );

        let ctx = Arc::new(ProxyContext {
            tls,
            limiter: limiter.clone(),
            access,
            pool,
            timeouts: config.timeouts.clone(),
        });

        Ok(Self {
            config,
            ctx,
            limiter,
        })
    }

    /// Run the server, accepting connections on the given listener until
    /// the drain begins, then wait out in-flight sessions.
    pub async fn run(self, listener: Listener, mut drain_signal: DrainSignal) {
        let sweeper = self
            .limiter
            .start_sweeper(self.config.rate_limit.sweep_interval());

        let mut handlers = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer, slot)) => {
                            handlers.spawn(handle_connection(
                                self.ctx.clone(),
                                stream,
                                peer,
                                slot,
                            ));
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Accept failed");
                        }
                    }
                }
                // Reap finished handlers so the set does not grow unbounded.
                Some(_) = handlers.join_next(), if !handlers.is_empty() => {}
                _ = drain_signal.draining() => break,
            }
        }

        // No new sockets past this point.
        drop(listener);
        sweeper.stop().await;

        let drain = self.config.timeouts.drain();
        tracing::info!(
            in_flight = handlers.len(),
            active_sessions = self.ctx.pool.total_active_sessions(),
            drain_secs = drain.as_secs(),
            "Draining connections"
        );

        let drained = tokio::time::timeout(drain, async {
            while handlers.join_next().await.is_some() {}
        })
        .await;

        match drained {
            Ok(()) => tracing::info!("All connections drained"),
            Err(_) => tracing::warn!(
                remaining = handlers.len(),
                "Drain window elapsed with connections still active"
            ),
        }
    }
}
