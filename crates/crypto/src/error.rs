//! Cryptographic error types.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The bytes do not form a valid Ed25519 public key.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// The bytes do not form a valid Ed25519 signature.
    #[error("invalid signature encoding")]
    InvalidSignature,

    /// The session signature in a Hello does not verify against the
    /// shared value.
    #[error("session signature verification failed")]
    BadSessionSignature,

    /// The peer speaks a protocol version outside our accepted window.
    #[error("protocol version mismatch: peer {peer:#x}, local {local:#x}")]
    VersionMismatch {
        /// Version the peer announced.
        peer: u32,
        /// Version we speak.
        local: u32,
    },

    /// The peer's clock is too far from ours to trust the handshake.
    #[error("network time skew of {skew}s exceeds tolerance")]
    ClockSkew {
        /// Observed absolute skew in seconds.
        skew: u64,
    },

    /// The TLS session refused to export keying material.
    #[error("TLS session cannot export keying material")]
    ExportFailed,

    /// Hex decoding failed.
    #[error("invalid hex encoding")]
    InvalidHex,
}
