//! Per-peer load accounting.
//!
//! Every connection attempt carries a [`Consumer`] handle from construction
//! through session handoff. Inbound traffic and request handling charge the
//! consumer; the overlay reads the running balance when deciding whether a
//! peer is abusing its slot.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Charge applied for every message received from a peer.
pub const FEE_MESSAGE: i64 = 1;

/// Charge applied for a request that triggers disk or ledger work.
pub const FEE_HEAVY_REQUEST: i64 = 10;

/// Balance above which a peer is considered to be overloading us.
pub const WARNING_THRESHOLD: i64 = 500;

#[derive(Debug, Default)]
struct Meter {
    balance: AtomicI64,
}

/// Load-accounting handle for one remote endpoint.
///
/// Cheap to clone; clones share the same balance. The handle survives the
/// handshake and is moved into the peer session on activation, so charges
/// accumulated during connection establishment count against the peer.
#[derive(Debug, Clone, Default)]
pub struct Consumer {
    meter: Arc<Meter>,
}

impl Consumer {
    /// Create a fresh consumer with zero balance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a charge.
    pub fn charge(&self, fee: i64) {
        self.meter.balance.fetch_add(fee, Ordering::Relaxed);
    }

    /// Current accumulated balance.
    pub fn balance(&self) -> i64 {
        self.meter.balance.load(Ordering::Relaxed)
    }

    /// Whether the accumulated balance has crossed the warning threshold.
    pub fn is_overloaded(&self) -> bool {
        self.balance() >= WARNING_THRESHOLD
    }
}
