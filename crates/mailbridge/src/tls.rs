//! TLS connector construction for the SMTP transport and the mail stores.

use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::aws_lc_rs;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{
    CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
    SupportedProtocolVersion,
};
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::config::SecureSocket;
use crate::{Error, Result};

/// Builds a connector from optional custom settings.
///
/// Without settings the connector trusts the webpki roots and allows every
/// TLS version and cipher suite rustls enables by default.
///
/// # Errors
///
/// Returns [`Error::Init`] if the certificate file cannot be loaded, a
/// protocol version is unknown, or no cipher suite is left after
/// filtering.
pub fn build_connector(secure_socket: Option<&SecureSocket>) -> Result<TlsConnector> {
    let mut provider = aws_lc_rs::default_provider();
    let mut roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let mut versions: Vec<&'static SupportedProtocolVersion> = rustls::DEFAULT_VERSIONS.to_vec();
    let mut verify_hostname = true;

    if let Some(socket) = secure_socket {
        if let Some(path) = &socket.cert {
            roots = RootCertStore::empty();
            let certs = CertificateDer::pem_file_iter(path).map_err(|e| {
                Error::Init(format!("cannot read certificate {}: {e}", path.display()))
            })?;
            for cert in certs {
                let cert = cert.map_err(|e| {
                    Error::Init(format!("invalid certificate in {}: {e}", path.display()))
                })?;
                roots
                    .add(cert)
                    .map_err(|e| Error::Init(format!("untrusted certificate: {e}")))?;
            }
            if roots.is_empty() {
                return Err(Error::Init(format!(
                    "no certificates found in {}",
                    path.display()
                )));
            }
        }

        if let Some(protocol) = socket.protocol.as_ref().filter(|p| !p.versions.is_empty()) {
            versions = protocol
                .versions
                .iter()
                .map(|name| protocol_version(name))
                .collect::<Result<_>>()?;
        }

        if let Some(ciphers) = &socket.ciphers {
            provider
                .cipher_suites
                .retain(|suite| ciphers.iter().any(|name| suite_matches(suite.suite(), name)));
            if provider.cipher_suites.is_empty() {
                return Err(Error::Init(format!(
                    "none of the cipher suites {ciphers:?} is supported"
                )));
            }
        }

        verify_hostname = socket.verify_hostname;
    }

    let provider = Arc::new(provider);
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_protocol_versions(&versions)
        .map_err(|e| Error::Init(format!("invalid TLS configuration: {e}")))?;

    let config = if verify_hostname {
        builder.with_root_certificates(roots).with_no_client_auth()
    } else {
        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .map_err(|e| Error::Init(format!("invalid trust roots: {e}")))?;
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(IgnoreHostname { inner }))
            .with_no_client_auth()
    };

    debug!(versions = versions.len(), verify_hostname, "TLS connector ready");
    Ok(TlsConnector::from(Arc::new(config)))
}

fn protocol_version(name: &str) -> Result<&'static SupportedProtocolVersion> {
    match name.to_ascii_uppercase().as_str() {
        "TLSV1.2" | "TLS1.2" => Ok(&rustls::version::TLS12),
        "TLSV1.3" | "TLS1.3" => Ok(&rustls::version::TLS13),
        _ => Err(Error::Init(format!("unsupported TLS protocol version: {name}"))),
    }
}

/// Compares a rustls suite with an IANA name.
///
/// rustls spells TLS 1.3 suites `TLS13_*` where IANA uses `TLS_*`.
fn suite_matches(suite: rustls::CipherSuite, name: &str) -> bool {
    let ours = format!("{suite:?}");
    let name = name.trim();
    if ours.eq_ignore_ascii_case(name) {
        return true;
    }
    match (ours.strip_prefix("TLS13_"), name.get(..4)) {
        (Some(rest), Some(prefix)) if prefix.eq_ignore_ascii_case("TLS_") => {
            name[4..].eq_ignore_ascii_case(rest)
        }
        _ => false,
    }
}

/// Verifier that accepts a certificate whose only defect is the host name.
#[derive(Debug)]
struct IgnoreHostname {
    inner: Arc<WebPkiServerVerifier>,
}

fn is_name_mismatch(err: &CertificateError) -> bool {
    matches!(err, CertificateError::NotValidForName)
        || format!("{err:?}").starts_with("NotValidForName")
}

impl ServerCertVerifier for IgnoreHostname {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Err(rustls::Error::InvalidCertificate(err)) if is_name_mismatch(&err) => {
                debug!(server = ?server_name, "accepting certificate for another host name");
                Ok(ServerCertVerified::assertion())
            }
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::config::TlsProtocol;

    #[test]
    fn default_connector_builds() {
        build_connector(None).unwrap();
    }

    #[test]
    fn restricted_versions_and_ciphers() {
        let socket = SecureSocket {
            protocol: Some(TlsProtocol {
                name: "TLS".into(),
                versions: vec!["TLSv1.3".into()],
            }),
            ciphers: Some(vec!["TLS_AES_128_GCM_SHA256".into()]),
            verify_hostname: false,
            ..SecureSocket::default()
        };
        build_connector(Some(&socket)).unwrap();
    }

    #[test]
    fn unknown_version_is_init_error() {
        let socket = SecureSocket {
            protocol: Some(TlsProtocol {
                name: "SSL".into(),
                versions: vec!["SSLv3".into()],
            }),
            ..SecureSocket::default()
        };
        assert_eq!(build_connector(Some(&socket)).err().unwrap().kind(), "InitError");
    }

    #[test]
    fn unknown_ciphers_are_init_error() {
        let socket = SecureSocket {
            ciphers: Some(vec!["TLS_RSA_WITH_RC4_128_MD5".into()]),
            ..SecureSocket::default()
        };
        assert_eq!(build_connector(Some(&socket)).err().unwrap().kind(), "InitError");
    }

    #[test]
    fn missing_cert_file_is_init_error() {
        let socket = SecureSocket {
            cert: Some("/nonexistent/mailbridge/ca.pem".into()),
            ..SecureSocket::default()
        };
        assert_eq!(build_connector(Some(&socket)).err().unwrap().kind(), "InitError");
    }

    #[test]
    fn iana_names_match_rustls_names() {
        assert!(suite_matches(
            rustls::CipherSuite::TLS13_AES_256_GCM_SHA384,
            "TLS_AES_256_GCM_SHA384"
        ));
        assert!(suite_matches(
            rustls::CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            "tls_ecdhe_rsa_with_aes_128_gcm_sha256"
        ));
        assert!(!suite_matches(
            rustls::CipherSuite::TLS13_AES_256_GCM_SHA384,
            "TLS_AES_128_GCM_SHA256"
        ));
    }
}
