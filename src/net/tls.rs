//! TLS termination.
//!
//! # Responsibilities
//! - Load certificate chains and private keys from PEM files
//! - Build the server configuration with mandatory client authentication
//!
//! # Design Decisions
//! - Uses rustls (no OpenSSL dependency)
//! - Client certificates are verified against a dedicated CA bundle; a
//!   handshake without a valid client certificate never completes
//! - The handshake itself runs in the connection handler, under a timeout,
//!   so a slow peer cannot stall the accept loop

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::ring::default_provider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use thiserror::Error;

use crate::config::TlsConfig;

/// Error type for TLS setup failures. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    EmptyCertChain(String),

    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    #[error("client verifier setup failed: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),

    #[error("TLS configuration rejected: {0}")]
    Config(#[from] rustls::Error),
}

/// Load a PEM certificate chain.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::EmptyCertChain(path.display().to_string()));
    }
    Ok(certs)
}

/// Load a PEM private key (PKCS#8, PKCS#1, or SEC1).
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.display().to_string()))
}

/// Build the listener's TLS configuration: server identity plus mandatory
/// verification of client certificates against the configured CA.
pub fn build_server_config(tls: &TlsConfig) -> Result<Arc<ServerConfig>, TlsError> {
    let cert_chain = load_certs(Path::new(&tls.cert_path))?;
    let key = load_private_key(Path::new(&tls.key_path))?;
    let ca_certs = load_certs(Path::new(&tls.client_ca_path))?;

    let mut roots = RootCertStore::empty();
    for cert in ca_certs {
        roots.add(cert)?;
    }

    // The provider is pinned rather than taken from process state, so the
    // configuration builds the same way no matter what else links rustls.
    let provider = Arc::new(default_provider());

    let verifier =
        WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone()).build()?;

    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_client_cert_verifier(verifier)
        .with_single_cert(cert_chain, key)?;

    Ok(Arc::new(config))
}
