//! HTTP upgrade handshake.
//!
//! An outbound attempt opens with a plain `GET / HTTP/1.1` whose headers
//! request an upgrade to the peer protocol and carry the Hello fields.
//! The server answers one of three ways:
//!
//! - `101 Switching Protocols` with its own Hello fields in headers,
//! - `503` with a JSON body `{"peer-ips": [...]}` redirecting us
//!   elsewhere,
//! - anything else, which ends the attempt.
//!
//! The response parser here is incremental: feed it bytes as they arrive
//! and it yields a [`Response`] once the headers (and `Content-Length`
//! body, if any) are complete. Bytes past the end of the response are
//! left in the caller's buffer.

use crate::{OverlayError, Result};
use bytes::BytesMut;
use rtx_common::PeerAddr;
use rtx_crypto::handshake::{protocol_string, Hello};

/// Upper bound on the header block we will buffer.
const MAX_HEADER_BYTES: usize = 16 * 1024;

/// Upper bound on a response body (redirect lists are tiny).
const MAX_RESPONSE_BODY_BYTES: usize = 1024 * 1024;

/// The `Connect-As` role we announce.
const CONNECT_AS: &str = "Peer";

/// Build the upgrade request for an outbound dial.
pub fn make_upgrade_request(hello: &Hello, user_agent: &str) -> String {
    let mut out = String::with_capacity(512);
    out.push_str("GET / HTTP/1.1\r\n");
    out.push_str(&format!(
        "Upgrade: {}\r\n",
        protocol_string(hello.protocol_version)
    ));
    out.push_str("Connection: Upgrade\r\n");
    out.push_str(&format!("Connect-As: {}\r\n", CONNECT_AS));
    out.push_str(&format!("User-Agent: {}\r\n", user_agent));
    append_hello_headers(&mut out, hello);
    out.push_str("\r\n");
    out
}

/// Build the `101 Switching Protocols` answer carrying our Hello.
///
/// Used by the inbound side of the handshake; tests use it to script
/// peers.
pub fn make_upgrade_response(hello: &Hello) -> String {
    let mut out = String::with_capacity(512);
    out.push_str("HTTP/1.1 101 Switching Protocols\r\n");
    out.push_str(&format!(
        "Upgrade: {}\r\n",
        protocol_string(hello.protocol_version)
    ));
    out.push_str("Connection: Upgrade\r\n");
    append_hello_headers(&mut out, hello);
    out.push_str("\r\n");
    out
}

/// Append the Hello fields as headers.
fn append_hello_headers(out: &mut String, hello: &Hello) {
    out.push_str(&format!("Public-Key: {}\r\n", hex::encode(hello.public_key)));
    out.push_str(&format!(
        "Session-Signature: {}\r\n",
        base64::encode(&hello.session_signature)
    ));
    out.push_str(&format!("Listening-Port: {}\r\n", hello.listening_port));
    out.push_str(&format!("Network-Time: {}\r\n", hello.network_time));
}

/// A parsed HTTP/1.1 response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
    /// Headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Body, when `Content-Length` announced one.
    pub body: Vec<u8>,
}

impl Response {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Is this response a valid upgrade to the peer protocol?
pub fn is_peer_upgrade(response: &Response) -> bool {
    response.status == 101
        && response
            .header("Upgrade")
            .map(|v| v.starts_with("RTXP/"))
            .unwrap_or(false)
        && response
            .header("Connection")
            .map(|v| v.eq_ignore_ascii_case("Upgrade"))
            .unwrap_or(false)
}

/// Parse `RTXP/major.minor` into a packed protocol version.
fn parse_protocol_token(token: &str) -> Option<u32> {
    let rest = token.strip_prefix("RTXP/")?;
    let (major, minor) = rest.split_once('.')?;
    let major: u16 = major.parse().ok()?;
    let minor: u16 = minor.parse().ok()?;
    Some(((major as u32) << 16) | minor as u32)
}

/// Reconstruct a Hello from upgrade-response headers.
pub fn parse_hello(response: &Response) -> Result<Hello> {
    let bad = |what: &str| OverlayError::Codec(format!("bad hello headers: {}", what));

    let version = response
        .header("Upgrade")
        .and_then(parse_protocol_token)
        .ok_or_else(|| bad("upgrade token"))?;

    let public_key = response
        .header("Public-Key")
        .and_then(|v| hex::decode(v).ok())
        .and_then(|v| <[u8; 32]>::try_from(v).ok())
        .ok_or_else(|| bad("public key"))?;

    let session_signature = response
        .header("Session-Signature")
        .and_then(|v| base64::decode(v).ok())
        .ok_or_else(|| bad("session signature"))?;

    let listening_port = response
        .header("Listening-Port")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let network_time = response
        .header("Network-Time")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| bad("network time"))?;

    Ok(Hello {
        protocol_version: version,
        protocol_version_min: version,
        public_key,
        session_signature,
        listening_port,
        network_time,
    })
}

/// Parse a `503` redirect body.
///
/// Returns `None` when the body is not the expected JSON shape; entries
/// that do not parse as `host:port` are skipped. The caller caps the
/// list length.
pub fn parse_redirect_body(body: &[u8], max_endpoints: usize) -> Option<Vec<PeerAddr>> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let ips = value.as_object()?.get("peer-ips")?.as_array()?;

    Some(
        ips.iter()
            .filter_map(|v| v.as_str())
            .filter_map(PeerAddr::parse)
            .take(max_endpoints)
            .collect(),
    )
}

#[derive(Debug)]
enum ParseState {
    Headers,
    Body {
        response: Response,
        content_length: usize,
    },
}

/// Incremental HTTP/1.1 response parser.
///
/// `feed` consumes exactly the bytes belonging to the response from the
/// buffer, so whatever follows the response (the first peer-protocol
/// frames) survives for the session.
#[derive(Debug)]
pub struct ResponseParser {
    state: ParseState,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseParser {
    /// Create a parser expecting a status line.
    pub fn new() -> Self {
        Self {
            state: ParseState::Headers,
        }
    }

    /// Consume what can be consumed from `buf`. Returns the response once
    /// it is complete.
    pub fn feed(&mut self, buf: &mut BytesMut) -> Result<Option<Response>> {
        loop {
            match &mut self.state {
                ParseState::Headers => {
                    let Some(end) = find_header_end(buf) else {
                        if buf.len() > MAX_HEADER_BYTES {
                            return Err(OverlayError::Codec("oversize response headers".into()));
                        }
                        return Ok(None);
                    };

                    let head = buf.split_to(end + 4);
                    let response = parse_head(&head)?;
                    let content_length = response
                        .header("Content-Length")
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(0);
                    if content_length > MAX_RESPONSE_BODY_BYTES {
                        return Err(OverlayError::Codec("oversize response body".into()));
                    }

                    if content_length == 0 {
                        self.state = ParseState::Headers;
                        return Ok(Some(response));
                    }
                    self.state = ParseState::Body {
                        response,
                        content_length,
                    };
                }
                ParseState::Body {
                    response,
                    content_length,
                } => {
                    if buf.len() < *content_length {
                        return Ok(None);
                    }
                    let body = buf.split_to(*content_length);
                    let mut done = response.clone();
                    done.body = body.to_vec();
                    self.state = ParseState::Headers;
                    return Ok(Some(done));
                }
            }
        }
    }
}

fn find_header_end(buf: &BytesMut) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_head(head: &[u8]) -> Result<Response> {
    let text = std::str::from_utf8(head)
        .map_err(|_| OverlayError::Codec("non-UTF8 response head".into()))?;
    let mut lines = text.split("\r\n");

    let status_line = lines
        .next()
        .ok_or_else(|| OverlayError::Codec("empty response".into()))?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts
        .next()
        .ok_or_else(|| OverlayError::Codec("bad status line".into()))?;
    if !version.starts_with("HTTP/1.") {
        return Err(OverlayError::Codec(format!(
            "unsupported HTTP version: {}",
            version
        )));
    }
    let status: u16 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| OverlayError::Codec("bad status code".into()))?;
    let reason = parts.next().unwrap_or("").to_string();

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| OverlayError::Codec(format!("bad header line: {}", line)))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok(Response {
        status,
        reason,
        headers,
        body: Vec::new(),
    })
}
