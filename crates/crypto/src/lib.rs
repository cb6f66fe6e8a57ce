//! Node identity and handshake authentication for rtx-node.
//!
//! Two concerns live here:
//!
//! - [`SecretKey`]/[`PublicKey`]/[`Signature`]: Ed25519 node identities.
//!   A node's public key is its durable name on the network.
//! - [`handshake`]: the session-binding scheme that replaces PKI trust.
//!   Both sides derive a [`handshake::SharedValue`] from the live TLS
//!   session and exchange Hello messages signed over it; a Hello that
//!   verifies proves the signer sits on this exact TLS session, not a
//!   relayed one.

pub mod handshake;

mod error;
mod keys;

pub use error::CryptoError;
pub use keys::{PublicKey, SecretKey, Signature};

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
