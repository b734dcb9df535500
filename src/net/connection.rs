//! Per-connection lifecycle.
//!
//! One handler task owns each accepted socket from accept to close and
//! drives it through a fixed sequence: TLS handshake, identity extraction,
//! rate-limit check, authorization, upstream selection, dial, splice. Any
//! failure closes the connection and recovers locally; a selection that
//! succeeded is always released, on every exit path, by the guard's drop.
//!
//! # State Machine
//! ```text
//! Accepted ──▶ Handshook ──▶ Identified ──▶ Admitted ──▶ Authorized
//!                                                             │
//!              Closed ◀── Released ◀── Spliced ◀── Picked ◀───┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::io::copy_bidirectional;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::TimeoutConfig;
use crate::load_balancer::{PickError, UpstreamPool};
use crate::net::identity::{ClientIdentity, IdentityError};
use crate::net::listener::SessionSlot;
use crate::observability::metrics;
use crate::security::{AccessTable, RateLimiter};

/// Shared state every connection handler needs.
pub struct ProxyContext {
    pub tls: TlsAcceptor,
    pub limiter: Arc<RateLimiter>,
    pub access: AccessTable,
    pub pool: Arc<UpstreamPool>,
    pub timeouts: TimeoutConfig,
}

/// Error type for a single connection's lifecycle. Each variant maps to one
/// failing transition; all are recovered locally by closing the connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("TLS handshake timed out")]
    HandshakeTimeout,

    #[error("TLS handshake failed: {0}")]
    Handshake(std::io::Error),

    #[error("client certificate rejected: {0}")]
    Identity(#[from] IdentityError),

    #[error("client '{client_id}' rate limited")]
    RateLimited { client_id: String },

    #[error("organization '{client_org}' is not authorized")]
    Unauthorized { client_org: String },

    #[error("no upstream available: {0}")]
    NoUpstream(#[from] PickError),

    #[error("dial to upstream {addr} timed out")]
    DialTimeout { addr: SocketAddr },

    #[error("dial to upstream {addr} failed: {source}")]
    Dial {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("forwarding failed: {0}")]
    Forward(std::io::Error),
}

impl ConnectionError {
    /// Stable label for the rejection counter.
    fn reason(&self) -> &'static str {
        match self {
            Self::HandshakeTimeout => "handshake_timeout",
            Self::Handshake(_) => "handshake",
            Self::Identity(_) => "bad_certificate",
            Self::RateLimited { .. } => "rate_limited",
            Self::Unauthorized { .. } => "unauthorized",
            Self::NoUpstream(_) => "no_upstream",
            Self::DialTimeout { .. } | Self::Dial { .. } => "dial_failed",
            Self::Forward(_) => "forward",
        }
    }
}

/// Handle one accepted socket to completion. Never returns an error; every
/// failure is logged at the level its kind warrants and the sockets close
/// on drop. The session slot is held until the handler finishes.
pub async fn handle_connection(
    ctx: Arc<ProxyContext>,
    stream: TcpStream,
    peer: SocketAddr,
    slot: SessionSlot,
) {
    let span = tracing::info_span!("conn", id = %Uuid::new_v4(), peer = %peer);
    async move {
        let _slot = slot;
        if let Err(err) = run(&ctx, stream).await {
            metrics::record_rejection(err.reason());
            log_close(&err);
        }
    }
    .instrument(span)
    .await
}

async fn run(ctx: &ProxyContext, stream: TcpStream) -> Result<(), ConnectionError> {
    // Accepted -> Handshook. A bounded handshake keeps slow peers from
    // holding sockets open indefinitely.
    let mut client = timeout(ctx.timeouts.handshake(), ctx.tls.accept(stream))
        .await
        .map_err(|_| ConnectionError::HandshakeTimeout)?
        .map_err(ConnectionError::Handshake)?;

    // Handshook -> Identified.
    let identity = {
        let (_, session) = client.get_ref();
        let certs = session.peer_certificates().unwrap_or_default();
        ClientIdentity::from_peer_certificates(certs)?
    };
    tracing::debug!(
        client_id = %identity.client_id,
        client_org = %identity.client_org,
        "Client identified"
    );

    // Identified -> Admitted. Denied attempts close without a reply.
    if !ctx.limiter.admit(&identity.client_id, Instant::now()) {
        return Err(ConnectionError::RateLimited {
            client_id: identity.client_id,
        });
    }

    // Admitted -> Authorized.
    let group = ctx
        .access
        .authorize(&identity.client_org)
        .ok_or_else(|| ConnectionError::Unauthorized {
            client_org: identity.client_org.clone(),
        })?
        .to_string();

    // Authorized -> Picked. From here on the guard's drop releases the
    // session slot on every exit path.
    let upstream = ctx.pool.pick(&group)?;

    // Picked -> Spliced.
    let mut server = timeout(ctx.timeouts.dial(), TcpStream::connect(upstream.addr))
        .await
        .map_err(|_| ConnectionError::DialTimeout { addr: upstream.addr })?
        .map_err(|source| ConnectionError::Dial {
            addr: upstream.addr,
            source,
        })?;

    tracing::debug!(
        client_id = %identity.client_id,
        group = %group,
        upstream = %upstream.addr,
        "Session established"
    );
    metrics::record_session_opened(&group);
    let started = Instant::now();

    // Spliced until either side closes or errors.
    let result = copy_bidirectional(&mut client, &mut server).await;
    metrics::record_session_closed(&group, started.elapsed());

    match result {
        Ok((sent, received)) => {
            tracing::info!(
                client_id = %identity.client_id,
                upstream = %upstream.addr,
                sent,
                received,
                "Session ended"
            );
            Ok(())
        }
        Err(e) => Err(ConnectionError::Forward(e)),
    }
}

/// Log a closed connection at the level its error kind warrants. Handshake
/// noise from scanners stays at debug; misconfiguration surfaces at warn.
fn log_close(err: &ConnectionError) {
    match err {
        ConnectionError::HandshakeTimeout
        | ConnectionError::Handshake(_)
        | ConnectionError::Forward(_) => {
            tracing::debug!(error = %err, "Connection closed");
        }
        ConnectionError::RateLimited { .. } => {
            tracing::debug!(error = %err, "Connection rejected");
        }
        ConnectionError::Identity(_) | ConnectionError::Unauthorized { .. } => {
            tracing::warn!(error = %err, "Connection rejected");
        }
        ConnectionError::NoUpstream(_)
        | ConnectionError::DialTimeout { .. }
        | ConnectionError::Dial { .. } => {
            tracing::warn!(error = %err, "Connection failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;

    fn pool_with_one(addr: &str) -> Arc<UpstreamPool> {
        Arc::new(UpstreamPool::from_config(&[UpstreamConfig {
            group: "groupA".into(),
            address: addr.into(),
        }]))
    }

    #[tokio::test]
    async fn test_dial_failure_releases_counter() {
        // Bind a port, then free it so the dial is refused.
        let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = closed.local_addr().unwrap();
        drop(closed);

        let pool = pool_with_one(&addr.to_string());

        let upstream = pool.pick("groupA").unwrap();
        assert_eq!(pool.total_active_sessions(), 1);

        let result = timeout(
            std::time::Duration::from_secs(5),
            TcpStream::connect(upstream.addr),
        )
        .await;
        let dialed = matches!(result, Ok(Ok(_)));
        drop(upstream);

        assert!(!dialed, "dial to a closed port should fail");
        assert_eq!(pool.total_active_sessions(), 0);

        // The released member is picked again.
        let again = pool.pick("groupA").unwrap();
        assert_eq!(again.active_sessions(), 1);
    }

    #[test]
    fn test_rejection_reasons_are_stable() {
        let err = ConnectionError::RateLimited {
            client_id: "alice".into(),
        };
        assert_eq!(err.reason(), "rate_limited");

        let err = ConnectionError::NoUpstream(PickError::UnknownGroup("g".into()));
        assert_eq!(err.reason(), "no_upstream");

        let err = ConnectionError::DialTimeout {
            addr: "127.0.0.1:9".parse().unwrap(),
        };
        assert_eq!(err.reason(), "dial_failed");
    }
}
