//! Error types for overlay operations.
//!
//! One enum covers the whole crate. The variants map onto the failure
//! kinds the rest of the node cares about: transport faults, the
//! handshake guard timer, cryptographic rejection, peer-finder policy,
//! and redirect advisories.

use thiserror::Error;

/// Errors that can occur during overlay operations.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// Underlying socket or TLS failure.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame or message body.
    #[error("codec error: {0}")]
    Codec(String),

    /// The shared per-stage guard timer expired.
    #[error("handshake timed out during {stage}")]
    Timeout {
        /// Name of the handshake stage that was outstanding.
        stage: &'static str,
    },

    /// Transport-level exchange succeeded but the peer failed a
    /// cryptographic or protocol-level check.
    #[error("handshake rejected: {0}")]
    HandshakeReject(#[from] rtx_crypto::CryptoError),

    /// The peer finder reports we already have a connection to this peer.
    #[error("duplicate connection")]
    DuplicateConnection,

    /// No outbound slot could be activated for the peer.
    #[error("outbound slots full")]
    SlotsFull,

    /// The peer answered the upgrade request with a redirect advisory.
    /// The advisory has already been handed to the overlay; the attempt
    /// itself is over.
    #[error("redirected")]
    Redirect,

    /// The peer answered the upgrade request with something other than an
    /// upgrade or a redirect.
    #[error("upgrade refused with HTTP status {0}")]
    UpgradeRefused(u16),

    /// The attempt was stopped from outside, or its overlay is gone.
    #[error("operation aborted")]
    Aborted,

    /// The timer interval handed to a peer set is outside the accepted
    /// range.
    #[error("timer interval {0}ms outside (10, 30000)")]
    BadTimerInterval(u64),

    /// Invariant violation; indicates a bug.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl OverlayError {
    /// Whether this failure is worth retrying against the same endpoint.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            OverlayError::Io(_) | OverlayError::Timeout { .. } | OverlayError::SlotsFull
        )
    }

    /// Whether this failure came from the peer misbehaving rather than
    /// from the network.
    pub fn is_peer_fault(&self) -> bool {
        matches!(
            self,
            OverlayError::Codec(_)
                | OverlayError::HandshakeReject(_)
                | OverlayError::UpgradeRefused(_)
        )
    }
}
