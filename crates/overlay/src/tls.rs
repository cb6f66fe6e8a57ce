//! TLS configuration for peer links.
//!
//! Peer connections run over TLS 1.2+, but trust does not come from
//! certificates: every node presents a throwaway self-signed certificate
//! and identity is proven by the session-bound Hello exchange instead
//! (see `rtx_crypto::handshake`). The client-side verifier therefore
//! accepts any certificate, and no client certificate is sent.

use std::sync::Arc;
use std::time::SystemTime;
use tokio_rustls::rustls::{
    self,
    client::{ServerCertVerified, ServerCertVerifier},
    Certificate, ClientConfig, PrivateKey, RootCertStore, ServerConfig, ServerName,
};
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// SNI name used for peer connections. Peers are dialed by address, so
/// the name is a fixed placeholder.
pub fn server_name() -> ServerName {
    ServerName::try_from("peer.invalid").expect("static server name")
}

/// Accepts any server certificate. Identity is established by the
/// session-bound Hello exchange, not by PKI.
struct AnyServerCert;

impl ServerCertVerifier for AnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

/// Client-side TLS configuration for outbound dials.
pub fn client_config() -> ClientConfig {
    let mut config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(RootCertStore::empty())
        .with_no_client_auth();
    config
        .dangerous()
        .set_certificate_verifier(Arc::new(AnyServerCert));
    config
}

/// Connector for outbound dials.
pub fn connector() -> TlsConnector {
    TlsConnector::from(Arc::new(client_config()))
}

/// Server-side TLS configuration from a DER certificate and key.
pub fn server_config(
    cert_der: Vec<u8>,
    key_der: Vec<u8>,
) -> Result<ServerConfig, rustls::Error> {
    ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(vec![Certificate(cert_der)], PrivateKey(key_der))
}

/// Acceptor for the inbound listener.
pub fn acceptor(cert_der: Vec<u8>, key_der: Vec<u8>) -> Result<TlsAcceptor, rustls::Error> {
    Ok(TlsAcceptor::from(Arc::new(server_config(
        cert_der, key_der,
    )?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_builds() {
        // The permissive verifier must not require any roots.
        let _ = connector();
    }

    #[test]
    fn test_server_config_rejects_garbage_key() {
        assert!(server_config(vec![1, 2, 3], vec![4, 5, 6]).is_err());
    }
}
