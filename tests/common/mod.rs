//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use mtls_proxy::config::{ProxyConfig, UpstreamConfig};
use mtls_proxy::lifecycle::DrainController;
use mtls_proxy::net::listener::Listener;
use mtls_proxy::ProxyServer;

/// Path to a PEM fixture under tests/testdata.
pub fn testdata(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/testdata")
        .join(name)
}

/// Start a mock upstream that answers every connection with one fixed HTTP
/// response. Returns the address it listens on.
pub async fn start_mock_upstream(body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        // Drain the request head before replying.
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;

                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Build a proxy configuration over the test certificates.
pub fn test_config(upstreams: &[(&str, SocketAddr)], access: &[(&str, &str)]) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.listener.tls.cert_path = testdata("server.pem").display().to_string();
    config.listener.tls.key_path = testdata("server.key").display().to_string();
    config.listener.tls.client_ca_path = testdata("ca.pem").display().to_string();

    for (group, addr) in upstreams {
        config.upstreams.push(UpstreamConfig {
            group: group.to_string(),
            address: addr.to_string(),
        });
    }
    for (org, group) in access {
        config
            .access
            .table
            .insert(org.to_string(), group.to_string());
    }

    config
}

/// Start the proxy on an ephemeral port. Returns the bound address, the
/// drain controller, and the server task handle.
pub async fn start_proxy(
    config: ProxyConfig,
) -> (SocketAddr, DrainController, tokio::task::JoinHandle<()>) {
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let drain = DrainController::new();
    let drain_signal = drain.signal();
    let server = ProxyServer::new(config).unwrap();

    let handle = tokio::spawn(async move {
        server.run(listener, drain_signal).await;
    });

    (addr, drain, handle)
}

/// Build an HTTPS client that trusts the test CA and presents the named
/// client certificate. Connection pooling is disabled so every request is
/// one proxied connection.
pub fn client_with_identity(name: &str) -> reqwest::Client {
    let ca = reqwest::Certificate::from_pem(&std::fs::read(testdata("ca.pem")).unwrap()).unwrap();

    let mut pem = std::fs::read(testdata(&format!("{name}.pem"))).unwrap();
    pem.extend(std::fs::read(testdata(&format!("{name}.key"))).unwrap());
    let identity = reqwest::Identity::from_pem(&pem).unwrap();

    reqwest::Client::builder()
        .use_rustls_tls()
        .add_root_certificate(ca)
        .identity(identity)
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Build an HTTPS client that trusts the test CA but presents no client
/// certificate.
#[allow(dead_code)]
pub fn client_without_identity() -> reqwest::Client {
    let ca = reqwest::Certificate::from_pem(&std::fs::read(testdata("ca.pem")).unwrap()).unwrap();

    reqwest::Client::builder()
        .use_rustls_tls()
        .add_root_certificate(ca)
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
