//! Peer networking for rtx-node.
//!
//! This crate owns the two coordination machines at the heart of the
//! node's networking:
//!
//! - **Connection establishment** ([`connect_attempt`]): upgrading a raw
//!   outbound TCP socket through TLS and the RTXP handshake into an
//!   authenticated peer session, guarded by a single per-stage timer.
//! - **Ledger acquisition** ([`peer_set`], [`acquire`]): timer-driven
//!   solicitation of a content-addressed artifact from whichever peers
//!   claim to have it, with progress detection and load-aware deferral.
//!
//! The overlay proper (slot bookkeeping, the live peer registry, session
//! ownership) is a collaborator behind the [`NodeOverlay`] trait; this
//! crate never owns peers, only ids and slots.

pub mod acquire;
pub mod codec;
pub mod connect_attempt;
pub mod http;
pub mod messages;
pub mod peer_set;
pub mod tls;

mod error;

pub use connect_attempt::{ConnectAttempt, HandshakeState};
pub use error::OverlayError;
pub use messages::{GetLedger, GetTxSet, LedgerData, LedgerItemKind, Message, MessageType};
pub use peer_set::{AcquireCore, AcquireStrategy, PeerSet};

use bytes::BytesMut;
use rtx_common::resource::Consumer;
use rtx_common::PeerAddr;
use rtx_crypto::handshake::Hello;
use rtx_crypto::{PublicKey, SecretKey};
use rtx_work::JobQueue;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Result type for overlay operations.
pub type Result<T> = std::result::Result<T, OverlayError>;

/// Configuration for outbound connection establishment.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Whether to attempt the HTTP upgrade handshake. When false, the
    /// legacy framed-Hello exchange is used.
    pub http_handshake: bool,
    /// Guard applied to every outstanding handshake network operation.
    pub handshake_timeout: Duration,
    /// Port we accept inbound connections on, advertised in our Hello.
    pub listening_port: u16,
    /// Cap on how many endpoints we accept from one redirect advisory.
    pub max_redirect_endpoints: usize,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            http_handshake: true,
            handshake_timeout: Duration::from_secs(15),
            listening_port: 51235,
            max_redirect_endpoints: 16,
        }
    }
}

/// Identifier the overlay assigns to a live peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Reservation in the overlay's peer finder.
///
/// A slot represents one in-flight or active peer channel and carries the
/// finder's discovery accounting. Deliberately neither `Clone` nor `Copy`:
/// it is released exactly once, either by moving into an activated session
/// or by handing it back through [`NodeOverlay::on_closed`].
#[derive(Debug)]
pub struct Slot {
    id: u64,
}

impl Slot {
    /// Mint a slot. Only overlay implementations should call this.
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    /// The finder's identifier for this reservation.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Outcome of asking the peer finder to activate an outbound slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivateResult {
    /// Slot activated; the session may be constructed.
    Success,
    /// No outbound capacity left.
    Full,
    /// We already hold a channel to this public key.
    Duplicate,
}

/// An authenticated peer session, produced by a successful handshake.
///
/// Hands the overlay everything it needs to run the session: the TLS
/// stream, any bytes read past the end of the handshake, the activated
/// slot, the load meter accumulated during establishment, and the peer's
/// verified identity.
pub struct PeerSession {
    /// Attempt id, carried over as the session id.
    pub id: u32,
    /// Endpoint we dialed.
    pub remote: PeerAddr,
    /// The TLS stream, ready for framed messages.
    pub stream: tokio_rustls::client::TlsStream<TcpStream>,
    /// Residual bytes read beyond the handshake, to be replayed into the
    /// session's parser before any further socket reads.
    pub residual: BytesMut,
    /// The activated slot.
    pub slot: Slot,
    /// Load accounting started at connect time.
    pub usage: Consumer,
    /// The peer's verified Hello.
    pub hello: Hello,
    /// The peer's authenticated identity.
    pub public_key: PublicKey,
}

/// Send handle for a live peer.
///
/// Sends are fire-and-forget over an unbounded channel; a send to a peer
/// that has since disconnected is silently dropped.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: PeerId,
    tx: mpsc::UnboundedSender<Message>,
}

impl PeerHandle {
    /// Create a handle feeding the given channel.
    pub fn new(id: PeerId, tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { id, tx }
    }

    /// The peer's id.
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Queue a message for the peer.
    pub fn send(&self, message: Message) {
        let _ = self.tx.send(message);
    }
}

/// The overlay as seen by this crate: peer finder, registry, and session
/// sink.
///
/// Implementations own all peer state. Connect attempts and peer sets hold
/// only weak references to the overlay and resolve peer ids on use.
pub trait NodeOverlay: Send + Sync {
    /// Reserve an outbound slot for `remote`. `None` when the finder has
    /// no capacity for another dial.
    fn new_outbound_slot(&self, remote: &PeerAddr) -> Option<Slot>;

    /// Report the locally observed endpoint once the socket is up.
    /// Returns false when the finder recognizes this as a duplicate
    /// connection, in which case the attempt must fail.
    fn on_connected(&self, slot: &Slot, local: std::net::SocketAddr) -> bool;

    /// Ask the finder to activate `slot` for the authenticated peer.
    fn activate(&self, slot: &Slot, key: &PublicKey, cluster: bool) -> ActivateResult;

    /// Release a slot that will never activate. Called exactly once per
    /// non-activated slot.
    fn on_closed(&self, slot: Slot);

    /// A peer answered our dial with alternative endpoints to try.
    fn on_redirects(&self, remote: &PeerAddr, redirects: Vec<PeerAddr>);

    /// Take ownership of an authenticated session.
    fn add_active(&self, session: PeerSession);

    /// Resolve a peer id to a send handle, if the peer is still live.
    fn get_peer_by_id(&self, id: PeerId) -> Option<PeerHandle>;

    /// Whether the peer is still known to the overlay.
    fn has_peer(&self, id: PeerId) -> bool;

    /// Whether the key belongs to a node in our configured cluster.
    fn node_in_cluster(&self, _key: &PublicKey) -> bool {
        false
    }
}

/// Everything a connection attempt or peer set needs from its
/// environment. Threaded explicitly through constructors; there are no
/// process-wide singletons.
#[derive(Clone)]
pub struct Context {
    /// The overlay collaborator. Weak: the overlay outlives attempts in
    /// practice, but nothing here keeps it alive.
    pub overlay: Weak<dyn NodeOverlay>,
    /// Shared job queue for deferrable work.
    pub jobs: Arc<JobQueue>,
    /// Our identity key, used to sign Hello messages.
    pub secret: SecretKey,
    /// Connection establishment configuration.
    pub config: OverlayConfig,
}

/// Seconds since the Unix epoch, as carried in Hello messages.
pub(crate) fn unix_time() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OverlayConfig::default();
        assert!(config.http_handshake);
        assert_eq!(config.handshake_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_peer_handle_send_after_drop() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = PeerHandle::new(PeerId(7), tx);
        drop(rx);
        // Fire-and-forget: no panic, no error surfaced.
        handle.send(Message::Ping(messages::Ping { seq: 1 }));
    }

    #[test]
    fn test_slot_ids() {
        let slot = Slot::new(42);
        assert_eq!(slot.id(), 42);
    }
}
