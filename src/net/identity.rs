//! Client identity extraction from peer certificates.
//!
//! The certificate subject carries both identifiers this proxy consumes:
//! CommonName is the stable per-client id (rate limiting key), the first
//! Organization value is the authorization key. Certificates without either
//! field are rejected.

use rustls::pki_types::CertificateDer;
use thiserror::Error;
use x509_parser::prelude::{FromDer, X509Certificate};

/// Error type for identity extraction failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("peer presented no certificate")]
    MissingCertificate,

    #[error("peer certificate is not valid DER")]
    BadEncoding,

    #[error("peer certificate subject has no CommonName")]
    MissingCommonName,

    #[error("peer certificate subject has no Organization")]
    MissingOrganization,
}

/// Identity of one authenticated client, scoped to a single connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Certificate CommonName; opaque identifier, compared exactly.
    pub client_id: String,
    /// First certificate Organization value; authorization key.
    pub client_org: String,
}

impl ClientIdentity {
    /// Extract the identity from a peer certificate chain. The end-entity
    /// certificate is the first element of the chain.
    pub fn from_peer_certificates(
        certs: &[CertificateDer<'_>],
    ) -> Result<Self, IdentityError> {
        let end_entity = certs.first().ok_or(IdentityError::MissingCertificate)?;
        let (_, parsed) = X509Certificate::from_der(end_entity.as_ref())
            .map_err(|_| IdentityError::BadEncoding)?;

        let client_id = parsed
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_owned)
            .filter(|cn| !cn.is_empty())
            .ok_or(IdentityError::MissingCommonName)?;

        // The Organization attribute is multi-valued; only the first value
        // participates in authorization.
        let client_org = parsed
            .subject()
            .iter_organization()
            .next()
            .and_then(|org| org.as_str().ok())
            .map(str::to_owned)
            .filter(|org| !org.is_empty())
            .ok_or(IdentityError::MissingOrganization)?;

        Ok(Self {
            client_id,
            client_org,
        })
    }
}
