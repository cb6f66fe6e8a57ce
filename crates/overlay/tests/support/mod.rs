//! Shared scaffolding for overlay integration tests: a recording
//! overlay implementation and a TLS test listener.
#![allow(dead_code)] // each test binary uses a different subset

use parking_lot::Mutex;
use rtx_common::PeerAddr;
use rtx_crypto::PublicKey;
use rtx_overlay::{
    ActivateResult, Message, NodeOverlay, PeerHandle, PeerId, PeerSession, Slot,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;

/// What a session looked like when it was handed to the overlay.
pub struct SessionRecord {
    pub id: u32,
    pub remote: PeerAddr,
    pub public_key: PublicKey,
    pub residual_len: usize,
    pub slot_id: u64,
}

/// Recording overlay double.
#[derive(Default)]
pub struct MockOverlay {
    next_slot: AtomicU64,
    pub on_connected_ok: AtomicBool,
    pub activate_result: Mutex<Option<ActivateResult>>,
    pub connected: AtomicUsize,
    pub closed: AtomicUsize,
    pub sessions: Mutex<Vec<SessionRecord>>,
    pub redirects: Mutex<Vec<(PeerAddr, Vec<PeerAddr>)>>,
    peers: Mutex<HashMap<PeerId, mpsc::UnboundedSender<Message>>>,
}

impl MockOverlay {
    pub fn new() -> Arc<Self> {
        let mock = Self::default();
        mock.on_connected_ok.store(true, Ordering::SeqCst);
        Arc::new(mock)
    }

    /// Register a live peer; messages sent to it land on the returned
    /// channel.
    pub fn add_peer(&self, id: PeerId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers.lock().insert(id, tx);
        rx
    }

    pub fn drop_peer(&self, id: PeerId) {
        self.peers.lock().remove(&id);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

impl NodeOverlay for MockOverlay {
    fn new_outbound_slot(&self, _remote: &PeerAddr) -> Option<Slot> {
        let id = self.next_slot.fetch_add(1, Ordering::SeqCst);
        Some(Slot::new(id))
    }

    fn on_connected(&self, _slot: &Slot, _local: std::net::SocketAddr) -> bool {
        self.connected.fetch_add(1, Ordering::SeqCst);
        self.on_connected_ok.load(Ordering::SeqCst)
    }

    fn activate(&self, _slot: &Slot, _key: &PublicKey, _cluster: bool) -> ActivateResult {
        (*self.activate_result.lock()).unwrap_or(ActivateResult::Success)
    }

    fn on_closed(&self, _slot: Slot) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_redirects(&self, remote: &PeerAddr, redirects: Vec<PeerAddr>) {
        self.redirects.lock().push((remote.clone(), redirects));
    }

    fn add_active(&self, session: PeerSession) {
        self.sessions.lock().push(SessionRecord {
            id: session.id,
            remote: session.remote.clone(),
            public_key: session.public_key,
            residual_len: session.residual.len(),
            slot_id: session.slot.id(),
        });
    }

    fn get_peer_by_id(&self, id: PeerId) -> Option<PeerHandle> {
        self.peers
            .lock()
            .get(&id)
            .map(|tx| PeerHandle::new(id, tx.clone()))
    }

    fn has_peer(&self, id: PeerId) -> bool {
        self.peers.lock().contains_key(&id)
    }
}

/// Weak trait-object handle to a mock overlay, for building a `Context`
/// or a `PeerSet`. The caller's `Arc` keeps the allocation alive.
pub fn overlay_weak(mock: &Arc<MockOverlay>) -> std::sync::Weak<dyn NodeOverlay> {
    let strong: Arc<dyn NodeOverlay> = Arc::clone(mock) as Arc<dyn NodeOverlay>;
    Arc::downgrade(&strong)
}

/// Bind a listener on a loopback port and return it with its address.
pub async fn bind_local() -> (TcpListener, PeerAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    (listener, PeerAddr::new("127.0.0.1", port))
}

/// TLS acceptor with a fresh self-signed certificate.
pub fn test_acceptor() -> TlsAcceptor {
    let cert = rcgen::generate_simple_self_signed(vec!["peer.invalid".to_string()])
        .expect("generate certificate");
    let cert_der = cert.serialize_der().expect("serialize certificate");
    let key_der = cert.serialize_private_key_der();
    rtx_overlay::tls::acceptor(cert_der, key_der).expect("acceptor")
}

/// Seconds since the Unix epoch.
pub fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_secs()
}
