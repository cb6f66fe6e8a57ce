//! Outbound connection establishment.
//!
//! A [`ConnectAttempt`] owns one outbound dial from raw TCP connect to
//! either an authenticated session handed to the overlay or a clean
//! failure. The attempt is an owning task: the caller spawns
//! [`ConnectAttempt::run`] and the state machine lives exactly as long
//! as the task. There is no shared mutable state; `stop()` is a
//! cancellation token observed at every suspension point.
//!
//! Every outstanding network operation is guarded by the same
//! [`OverlayConfig::handshake_timeout`] budget: the guard is armed when
//! an operation is dispatched and disarmed when it completes, so at most
//! one timer exists per attempt at any instant.
//!
//! Resource discipline: the slot reserved at construction is released on
//! every exit path: moved into the session on activation, or handed
//! back through `on_closed` otherwise.

use crate::{
    codec, http, messages::Message, messages::MessageType, tls, unix_time, ActivateResult,
    Context, NodeOverlay, OverlayError, PeerSession, Result, Slot,
};
use bytes::BytesMut;
use rtx_common::resource::Consumer;
use rtx_common::{build_version, PeerAddr};
use rtx_crypto::handshake::{self, Hello, SharedValue};
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// States of the outbound handshake machine.
///
/// Every state has exactly one successor on success; any state can fall
/// to `Closing` on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Constructed, not yet running.
    Init,
    /// TCP connect outstanding.
    Connecting,
    /// TLS handshake outstanding.
    TlsHandshaking,
    /// Writing the HTTP upgrade request.
    HttpWriting,
    /// Reading the HTTP upgrade response.
    HttpReading,
    /// Writing the framed Hello (legacy mode).
    LegacyWritingHello,
    /// Reading the framed Hello header (legacy mode).
    LegacyReadingHeader,
    /// Reading the framed Hello body (legacy mode).
    LegacyReadingBody,
    /// Verifying the peer's Hello and activating the slot.
    Authenticating,
    /// Terminal success; the session has been handed off.
    Activated,
    /// Terminal failure; resources being released.
    Closing,
    /// Fully torn down.
    Dead,
}

impl HandshakeState {
    /// Stable name for logs and timeout reports.
    pub fn name(&self) -> &'static str {
        match self {
            HandshakeState::Init => "init",
            HandshakeState::Connecting => "connect",
            HandshakeState::TlsHandshaking => "tls handshake",
            HandshakeState::HttpWriting => "upgrade write",
            HandshakeState::HttpReading => "upgrade read",
            HandshakeState::LegacyWritingHello => "hello write",
            HandshakeState::LegacyReadingHeader => "hello header read",
            HandshakeState::LegacyReadingBody => "hello body read",
            HandshakeState::Authenticating => "authenticate",
            HandshakeState::Activated => "activated",
            HandshakeState::Closing => "closing",
            HandshakeState::Dead => "dead",
        }
    }
}

/// One outbound connection attempt.
pub struct ConnectAttempt {
    id: u32,
    remote: PeerAddr,
    ctx: Context,
    usage: Consumer,
    cancel: CancellationToken,
    state: HandshakeState,
    slot: Option<Slot>,
}

impl ConnectAttempt {
    /// Reserve a slot and prepare an attempt.
    ///
    /// Returns `None` when the overlay is gone or the peer finder has no
    /// outbound capacity for this endpoint.
    pub fn new(ctx: Context, id: u32, remote: PeerAddr) -> Option<Self> {
        let overlay = ctx.overlay.upgrade()?;
        let slot = overlay.new_outbound_slot(&remote)?;
        trace!(id, remote = %remote, "connect attempt prepared");
        Some(Self {
            id,
            remote,
            ctx,
            usage: Consumer::new(),
            cancel: CancellationToken::new(),
            state: HandshakeState::Init,
            slot: Some(slot),
        })
    }

    /// Token for stopping the attempt from any thread. Cancellation is
    /// observed at the next suspension point; the already-dispatched
    /// operation simply never completes into further work.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current state. Meaningful mostly for diagnostics.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Drive the attempt to a terminal state.
    ///
    /// On success the authenticated session has been handed to the
    /// overlay. On failure all resources are released before this
    /// returns; nothing retries at this layer.
    pub async fn run(mut self) -> Result<()> {
        let result = self.drive().await;
        match &result {
            Ok(()) => {
                self.state = HandshakeState::Activated;
            }
            Err(OverlayError::Aborted) => {
                debug!(id = self.id, "connect attempt aborted");
                self.state = HandshakeState::Closing;
            }
            Err(err) => {
                debug!(id = self.id, remote = %self.remote, %err, "connect attempt failed");
                self.state = HandshakeState::Closing;
            }
        }
        self.close();
        result
    }

    /// Release whatever is still held. Idempotent.
    fn close(&mut self) {
        if let Some(slot) = self.slot.take() {
            if let Some(overlay) = self.ctx.overlay.upgrade() {
                overlay.on_closed(slot);
            }
        }
        if self.state == HandshakeState::Closing {
            self.state = HandshakeState::Dead;
        }
    }

    fn overlay(&self) -> Result<Arc<dyn NodeOverlay>> {
        // An overlay torn down mid-attempt reads the same as a stop().
        self.ctx.overlay.upgrade().ok_or(OverlayError::Aborted)
    }

    fn slot_ref(&self) -> Result<&Slot> {
        self.slot
            .as_ref()
            .ok_or(OverlayError::Internal("slot already released"))
    }

    /// Apply the shared per-stage guard to one network operation.
    async fn guarded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(OverlayError::Aborted),
            outcome = tokio::time::timeout(self.ctx.config.handshake_timeout, fut) => {
                match outcome {
                    Err(_) => Err(OverlayError::Timeout { stage: self.state.name() }),
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => Err(err.into()),
                }
            }
        }
    }

    async fn drive(&mut self) -> Result<()> {
        debug!(id = self.id, remote = %self.remote, "connect");

        self.state = HandshakeState::Connecting;
        let tcp = self
            .guarded(TcpStream::connect(self.remote.to_socket_addr()))
            .await?;
        let local = tcp.local_addr()?;
        tcp.set_nodelay(true)?;

        self.state = HandshakeState::TlsHandshaking;
        let connector = tls::connector();
        let stream = self.guarded(connector.connect(tls::server_name(), tcp)).await?;

        // Register the live socket with the peer finder before any
        // application bytes move; it may know this endpoint already.
        let overlay = self.overlay()?;
        if !overlay.on_connected(self.slot_ref()?, local) {
            return Err(OverlayError::DuplicateConnection);
        }
        drop(overlay);

        let (_, tls_conn) = stream.get_ref();
        let shared = handshake::make_shared_value_client(tls_conn)?;
        let hello = handshake::build_hello(
            &shared,
            &self.ctx.secret,
            self.ctx.config.listening_port,
            unix_time(),
        );

        if self.ctx.config.http_handshake {
            self.do_upgrade(stream, shared, hello).await
        } else {
            self.do_legacy(stream, shared, hello).await
        }
    }

    /// HTTP-upgrade handshake path.
    async fn do_upgrade(
        &mut self,
        mut stream: TlsStream<TcpStream>,
        shared: SharedValue,
        hello: Hello,
    ) -> Result<()> {
        self.state = HandshakeState::HttpWriting;
        let request = http::make_upgrade_request(&hello, build_version());
        self.guarded(stream.write_all(request.as_bytes())).await?;

        self.state = HandshakeState::HttpReading;
        let mut parser = http::ResponseParser::new();
        let mut read_buf = BytesMut::with_capacity(4096);
        let response = loop {
            let n = self.guarded(stream.read_buf(&mut read_buf)).await?;
            if n == 0 {
                // EOF mid-response: orderly TLS shutdown, then report.
                let _ = self.guarded(stream.shutdown()).await;
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
            }
            if let Some(response) = parser.feed(&mut read_buf)? {
                break response;
            }
        };

        if response.status == 503 {
            // Any parseable peer-ips list is an advisory, even one whose
            // entries all failed to parse; only a malformed body is
            // swallowed.
            if let Some(endpoints) =
                http::parse_redirect_body(&response.body, self.ctx.config.max_redirect_endpoints)
            {
                debug!(id = self.id, count = endpoints.len(), "redirect advisory");
                self.overlay()?.on_redirects(&self.remote, endpoints);
            }
            return Err(OverlayError::Redirect);
        }

        if !http::is_peer_upgrade(&response) {
            info!(
                id = self.id,
                status = response.status,
                reason = %response.reason,
                "HTTP response is not an upgrade"
            );
            return Err(OverlayError::UpgradeRefused(response.status));
        }

        self.state = HandshakeState::Authenticating;
        let peer_hello = http::parse_hello(&response)?;
        self.activate(stream, read_buf, shared, peer_hello)
    }

    /// A failed handshake read: EOF gets an orderly TLS shutdown before
    /// the error is reported; everything else passes through.
    async fn close_on_eof(
        &self,
        stream: &mut TlsStream<TcpStream>,
        err: OverlayError,
    ) -> OverlayError {
        if matches!(&err, OverlayError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof)
        {
            let _ = self.guarded(stream.shutdown()).await;
        }
        err
    }

    /// Legacy framed-Hello handshake path.
    async fn do_legacy(
        &mut self,
        mut stream: TlsStream<TcpStream>,
        shared: SharedValue,
        hello: Hello,
    ) -> Result<()> {
        self.state = HandshakeState::LegacyWritingHello;
        let frame = codec::encode_message(&Message::Hello(hello))?;
        self.guarded(stream.write_all(&frame)).await?;

        self.state = HandshakeState::LegacyReadingHeader;
        let mut header = [0u8; codec::HEADER_BYTES];
        if let Err(err) = self.guarded(stream.read_exact(&mut header)).await {
            return Err(self.close_on_eof(&mut stream, err).await);
        }
        let (body_len, message_type) = codec::parse_header(&header)?;
        if message_type != MessageType::Hello {
            return Err(OverlayError::Codec(format!(
                "expected HELLO, got {}",
                message_type.name()
            )));
        }

        self.state = HandshakeState::LegacyReadingBody;
        let mut body = vec![0u8; body_len];
        if let Err(err) = self.guarded(stream.read_exact(&mut body)).await {
            return Err(self.close_on_eof(&mut stream, err).await);
        }
        let peer_hello = match codec::decode_body(MessageType::Hello, &body)? {
            Message::Hello(hello) => hello,
            _ => return Err(OverlayError::Internal("hello body decoded as non-hello")),
        };

        self.state = HandshakeState::Authenticating;
        self.activate(stream, BytesMut::new(), shared, peer_hello)
    }

    /// Verify the peer's Hello, activate the slot, and hand the session
    /// to the overlay.
    fn activate(
        &mut self,
        stream: TlsStream<TcpStream>,
        residual: BytesMut,
        shared: SharedValue,
        peer_hello: Hello,
    ) -> Result<()> {
        // Failure here terminates without logging the message contents.
        let public_key = handshake::verify_hello(&peer_hello, &shared, unix_time())?;

        let overlay = self.overlay()?;
        let cluster = overlay.node_in_cluster(&public_key);
        info!(
            id = self.id,
            key = %public_key,
            protocol = %handshake::protocol_string(peer_hello.protocol_version),
            cluster,
            "peer authenticated"
        );

        match overlay.activate(self.slot_ref()?, &public_key, cluster) {
            ActivateResult::Success => {}
            ActivateResult::Full | ActivateResult::Duplicate => {
                return Err(OverlayError::SlotsFull)
            }
        }

        let slot = self
            .slot
            .take()
            .ok_or(OverlayError::Internal("slot already released"))?;
        overlay.add_active(PeerSession {
            id: self.id,
            remote: self.remote.clone(),
            stream,
            residual,
            slot,
            usage: self.usage.clone(),
            hello: peer_hello,
            public_key,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names_distinct() {
        let states = [
            HandshakeState::Init,
            HandshakeState::Connecting,
            HandshakeState::TlsHandshaking,
            HandshakeState::HttpWriting,
            HandshakeState::HttpReading,
            HandshakeState::LegacyWritingHello,
            HandshakeState::LegacyReadingHeader,
            HandshakeState::LegacyReadingBody,
            HandshakeState::Authenticating,
            HandshakeState::Activated,
            HandshakeState::Closing,
            HandshakeState::Dead,
        ];
        let names: std::collections::HashSet<_> = states.iter().map(|s| s.name()).collect();
        assert_eq!(names.len(), states.len());
    }
}
