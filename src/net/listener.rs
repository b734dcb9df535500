//! TCP accept path with load shedding.
//!
//! Capacity is a fixed number of session slots. A socket that arrives while
//! every slot is taken is dropped on the spot, before any TLS work, so an
//! overloaded proxy fails new clients fast instead of queueing handshakes it
//! cannot serve. Each admitted connection carries its slot as an RAII value;
//! the slot returns when the handler finishes, panics included.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;
use crate::observability::metrics;

/// Error type for the accept path.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(std::io::Error),
}

/// TCP listener bounded by a fixed pool of session slots.
#[derive(Debug)]
pub struct Listener {
    tcp: TcpListener,
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl Listener {
    /// Bind to the configured address.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config.bind_address.parse().map_err(|e| ListenerError::Bind {
            addr: config.bind_address.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
        })?;

        let tcp = TcpListener::bind(addr).await.map_err(|source| ListenerError::Bind {
            addr: config.bind_address.clone(),
            source,
        })?;
        let local_addr = tcp.local_addr().map_err(|source| ListenerError::Bind {
            addr: config.bind_address.clone(),
            source,
        })?;

        tracing::info!(
            address = %local_addr,
            session_slots = config.max_connections,
            "Accepting mTLS connections"
        );

        Ok(Self {
            tcp,
            slots: Arc::new(Semaphore::new(config.max_connections)),
            capacity: config.max_connections,
        })
    }

    /// Accept the next connection that fits within capacity.
    ///
    /// Sockets arriving with no slot free are shed: counted, logged, and
    /// closed by drop. The loop only yields connections that hold a slot.
    pub async fn accept(
        &self,
    ) -> Result<(TcpStream, SocketAddr, SessionSlot), ListenerError> {
        loop {
            let (stream, peer) = self.tcp.accept().await.map_err(ListenerError::Accept)?;

            match self.slots.clone().try_acquire_owned() {
                Ok(permit) => {
                    return Ok((stream, peer, SessionSlot { _permit: permit }));
                }
                Err(_) => {
                    metrics::record_rejection("over_capacity");
                    tracing::warn!(
                        peer = %peer,
                        session_slots = self.capacity,
                        "Shedding connection, every session slot is in use"
                    );
                    // stream drops here, closing the socket
                }
            }
        }
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.tcp.local_addr()
    }
}

/// One admitted connection's claim on listener capacity.
#[derive(Debug)]
pub struct SessionSlot {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn config(max_connections: usize) -> ListenerConfig {
        ListenerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            max_connections,
            ..ListenerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_connections_beyond_capacity_are_shed() {
        let listener = Listener::bind(&config(1)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        // First connection takes the only slot.
        let _first = TcpStream::connect(addr).await.unwrap();
        let (_stream, _peer, slot) = listener.accept().await.unwrap();

        // The second is shed; its socket closes without any bytes.
        let mut second = TcpStream::connect(addr).await.unwrap();
        let accept = tokio::spawn(async move { listener.accept().await });

        let mut buf = [0u8; 1];
        let read = second.read(&mut buf).await;
        assert!(
            matches!(read, Ok(0) | Err(_)),
            "shed socket should close without data"
        );

        // Releasing the slot lets the pending accept admit a new socket.
        drop(slot);
        let _third = TcpStream::connect(addr).await.unwrap();
        let (_stream, _peer, _slot) = accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_error_names_the_address() {
        let err = Listener::bind(&ListenerConfig {
            bind_address: "not-an-address".to_string(),
            ..ListenerConfig::default()
        })
        .await
        .unwrap_err();

        assert!(err.to_string().contains("not-an-address"));
    }
}
