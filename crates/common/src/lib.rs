//! Shared primitives for rtx-node.
//!
//! This crate holds the small types every other crate speaks:
//!
//! - [`Hash256`]: content hashes (ledger and transaction-set fingerprints)
//! - [`PeerAddr`]: host:port endpoints as exchanged on the wire
//! - [`math`]: 128-bit intermediate arithmetic for fixed-point rates
//! - [`resource`]: per-peer load accounting handles

pub mod math;
pub mod resource;

mod hash;

pub use hash::Hash256;

use serde::{Deserialize, Serialize};

/// Version string reported in the HTTP upgrade request and Hello exchange.
pub const BUILD_VERSION: &str = concat!("rtx-node-", env!("CARGO_PKG_VERSION"));

/// Returns the full version string used as the `User-Agent` value.
pub fn build_version() -> &'static str {
    BUILD_VERSION
}

/// Address of a peer on the network.
///
/// This is the form endpoints take in redirect advisories and peer exchange:
/// a host (IP or name) plus a port. Parsing is strict about the port but
/// permissive about the host, which is only resolved at connect time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddr {
    /// IP address or hostname.
    pub host: String,
    /// Port number.
    pub port: u16,
}

impl PeerAddr {
    /// Create a new peer address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a `host:port` string.
    ///
    /// Returns `None` for strings without a valid trailing port or with an
    /// empty host. Used when sifting redirect lists, where bad entries are
    /// skipped rather than reported.
    pub fn parse(s: &str) -> Option<Self> {
        let (host, port) = s.rsplit_once(':')?;
        if host.is_empty() {
            return None;
        }
        let port: u16 = port.parse().ok()?;
        if port == 0 {
            return None;
        }
        Some(Self::new(host, port))
    }

    /// Convert to a socket address string for connecting.
    pub fn to_socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
