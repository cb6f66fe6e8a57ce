//! Session-bound handshake authentication.
//!
//! The overlay does not verify TLS certificates. Instead, both ends of a
//! connection derive the same [`SharedValue`] from the live TLS session
//! (RFC 5705 exporter material) and sign it with their node identity key
//! inside the Hello exchange. Verifying the peer's Hello against the local
//! shared value proves two things at once: the peer controls the private
//! key for the identity it claims, and it is speaking on *this* TLS
//! session rather than replaying or relaying another one.

use crate::{CryptoError, PublicKey, SecretKey, Signature};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_rustls::rustls;

/// Exporter label for shared-value derivation. Both sides must use the
/// same label or the handshake cannot succeed.
pub const EXPORTER_LABEL: &[u8] = b"EXPORTER rtx-node handshake";

/// Protocol version we speak, packed as `major << 16 | minor`.
pub const PROTOCOL_VERSION: u32 = (1 << 16) | 2;

/// Oldest protocol version we still accept from a peer.
pub const PROTOCOL_VERSION_MIN: u32 = (1 << 16) | 2;

/// Maximum tolerated difference between the peer's clock and ours.
pub const CLOCK_TOLERANCE_SECS: u64 = 20;

/// Render a packed protocol version as `RTXP/major.minor`.
pub fn protocol_string(version: u32) -> String {
    format!("RTXP/{}.{}", version >> 16, version & 0xffff)
}

/// The 32-byte value binding a peer identity to one TLS session.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SharedValue(pub [u8; 32]);

impl SharedValue {
    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SharedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the value itself; it is secret for the session's
        // lifetime.
        write!(f, "SharedValue(..)")
    }
}

fn shared_value_from_material(material: [u8; 32]) -> SharedValue {
    // Hash the exporter output so the value handed around the codebase is
    // not directly usable as keying material.
    let mut hasher = Sha256::new();
    hasher.update(material);
    SharedValue(hasher.finalize().into())
}

/// Derive the shared value on the client side of a TLS session.
///
/// Fails if the TLS handshake has not completed.
pub fn make_shared_value_client(
    conn: &rustls::ClientConnection,
) -> Result<SharedValue, CryptoError> {
    let mut material = [0u8; 32];
    conn.export_keying_material(&mut material, EXPORTER_LABEL, None)
        .map_err(|_| CryptoError::ExportFailed)?;
    Ok(shared_value_from_material(material))
}

/// Derive the shared value on the server side of a TLS session.
///
/// Produces the same value as [`make_shared_value_client`] on the other
/// end of the same session.
pub fn make_shared_value_server(
    conn: &rustls::ServerConnection,
) -> Result<SharedValue, CryptoError> {
    let mut material = [0u8; 32];
    conn.export_keying_material(&mut material, EXPORTER_LABEL, None)
        .map_err(|_| CryptoError::ExportFailed)?;
    Ok(shared_value_from_material(material))
}

/// The first application-level message on a peer connection.
///
/// Carries the peer's identity, its proof of session ownership, and the
/// few facts needed to decide whether to keep talking to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Protocol version the sender speaks.
    pub protocol_version: u32,
    /// Oldest protocol version the sender accepts.
    pub protocol_version_min: u32,
    /// Sender's Ed25519 identity key.
    pub public_key: [u8; 32],
    /// Signature over the shared value, proving session ownership.
    pub session_signature: Vec<u8>,
    /// Port the sender accepts inbound connections on (0 if none).
    pub listening_port: u16,
    /// Sender's wall clock, seconds since the Unix epoch.
    pub network_time: u64,
}

/// Build a signed Hello for this session.
pub fn build_hello(
    shared: &SharedValue,
    secret: &SecretKey,
    listening_port: u16,
    now: u64,
) -> Hello {
    let signature = secret.sign(shared.as_bytes());
    Hello {
        protocol_version: PROTOCOL_VERSION,
        protocol_version_min: PROTOCOL_VERSION_MIN,
        public_key: *secret.public_key().as_bytes(),
        session_signature: signature.to_bytes().to_vec(),
        listening_port,
        network_time: now,
    }
}

/// Verify a peer's Hello against our view of the session.
///
/// Checks, in order: protocol version window, clock skew, and the session
/// signature. On success returns the peer's authenticated public key.
/// Callers must not log the Hello contents on failure.
pub fn verify_hello(
    hello: &Hello,
    shared: &SharedValue,
    now: u64,
) -> Result<PublicKey, CryptoError> {
    if hello.protocol_version < PROTOCOL_VERSION_MIN || hello.protocol_version_min > PROTOCOL_VERSION
    {
        return Err(CryptoError::VersionMismatch {
            peer: hello.protocol_version,
            local: PROTOCOL_VERSION,
        });
    }

    let skew = now.abs_diff(hello.network_time);
    if skew > CLOCK_TOLERANCE_SECS {
        return Err(CryptoError::ClockSkew { skew });
    }

    let public_key = PublicKey::from_bytes(&hello.public_key)?;
    let signature = Signature::from_slice(&hello.session_signature)?;
    public_key.verify(shared.as_bytes(), &signature)?;

    Ok(public_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn test_shared() -> SharedValue {
        SharedValue([0x42; 32])
    }

    #[test]
    fn test_hello_roundtrip() {
        let secret = SecretKey::generate();
        let shared = test_shared();
        let hello = build_hello(&shared, &secret, 51235, NOW);

        let key = verify_hello(&hello, &shared, NOW).unwrap();
        assert_eq!(key, secret.public_key());
    }

    #[test]
    fn test_hello_wrong_session() {
        let secret = SecretKey::generate();
        let hello = build_hello(&test_shared(), &secret, 51235, NOW);

        let other = SharedValue([0x43; 32]);
        assert!(matches!(
            verify_hello(&hello, &other, NOW),
            Err(CryptoError::BadSessionSignature)
        ));
    }

    #[test]
    fn test_hello_tampered_key() {
        let secret = SecretKey::generate();
        let shared = test_shared();
        let mut hello = build_hello(&shared, &secret, 51235, NOW);
        hello.public_key = *SecretKey::generate().public_key().as_bytes();

        assert!(verify_hello(&hello, &shared, NOW).is_err());
    }

    #[test]
    fn test_hello_version_window() {
        let secret = SecretKey::generate();
        let shared = test_shared();
        let mut hello = build_hello(&shared, &secret, 51235, NOW);
        hello.protocol_version = 1; // hopelessly old

        assert!(matches!(
            verify_hello(&hello, &shared, NOW),
            Err(CryptoError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_hello_clock_skew() {
        let secret = SecretKey::generate();
        let shared = test_shared();
        let hello = build_hello(&shared, &secret, 51235, NOW);

        assert!(verify_hello(&hello, &shared, NOW + CLOCK_TOLERANCE_SECS).is_ok());
        assert!(matches!(
            verify_hello(&hello, &shared, NOW + CLOCK_TOLERANCE_SECS + 1),
            Err(CryptoError::ClockSkew { .. })
        ));
    }

    #[test]
    fn test_protocol_string() {
        assert_eq!(protocol_string(PROTOCOL_VERSION), "RTXP/1.2");
    }
}
