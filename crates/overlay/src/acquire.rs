//! Concrete acquisition strategies.
//!
//! Two artifacts are fetched through [`PeerSet`]s: whole ledgers during
//! sync, and transaction sets referenced by consensus. The coordination
//! skeleton is identical; what differs is the request shape, the retry
//! posture, and when to give up. That variant behavior lives here.

use crate::messages::{GetLedger, GetTxSet, Message};
use crate::peer_set::{AcquireCore, AcquireStrategy, PeerSet};
use crate::{NodeOverlay, PeerId, Result};
use rtx_common::Hash256;
use rtx_work::JobQueue;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Tick interval for ledger acquisition.
pub const INBOUND_LEDGER_INTERVAL_MS: u64 = 250;

/// Tick interval for transaction-set acquisition.
pub const TX_SET_INTERVAL_MS: u64 = 500;

/// Silent ticks before ledger acquisition is abandoned.
pub const MAX_LEDGER_TIMEOUTS: u32 = 8;

/// Silent ticks before transaction-set acquisition is abandoned.
pub const MAX_TX_SET_TIMEOUTS: u32 = 10;

/// Silent ticks before escalating from unicast probes to broadcast.
const AGGRESSIVE_AFTER: u32 = 2;

/// Build a ledger acquisition set. Ticks are load-deferred behind the
/// ledger-data job count.
pub fn inbound_ledger(
    overlay: Weak<dyn NodeOverlay>,
    jobs: Arc<JobQueue>,
    fingerprint: Hash256,
) -> Result<PeerSet> {
    PeerSet::new(
        overlay,
        jobs,
        fingerprint,
        INBOUND_LEDGER_INTERVAL_MS,
        false,
        Box::new(LedgerAcquire),
    )
}

/// Build a transaction-set acquisition set. Ticks are never deferred.
pub fn tx_set(
    overlay: Weak<dyn NodeOverlay>,
    jobs: Arc<JobQueue>,
    fingerprint: Hash256,
) -> Result<PeerSet> {
    PeerSet::new(
        overlay,
        jobs,
        fingerprint,
        TX_SET_INTERVAL_MS,
        true,
        Box::new(TxSetAcquire),
    )
}

/// Strategy for fetching a ledger.
///
/// Each newly admitted peer gets an immediate unicast probe. Silent
/// ticks escalate: first re-probe the least-tried peer, then broadcast
/// to the whole set, and finally give up.
pub struct LedgerAcquire;

impl LedgerAcquire {
    fn request(core: &AcquireCore) -> Message {
        Message::GetLedger(GetLedger::base(core.fingerprint()))
    }
}

impl AcquireStrategy for LedgerAcquire {
    fn new_peer(&mut self, core: &mut AcquireCore, peer: PeerId) {
        let message = Self::request(core);
        core.record_attempt(peer);
        core.send_request_to(&message, Some(peer));
    }

    fn on_timer(&mut self, core: &mut AcquireCore, progress: bool) {
        if progress {
            return;
        }
        if core.timeouts() >= MAX_LEDGER_TIMEOUTS {
            warn!(
                fingerprint = %core.fingerprint(),
                timeouts = core.timeouts(),
                "abandoning ledger acquisition"
            );
            core.mark_failed();
            return;
        }

        let message = Self::request(core);
        if core.timeouts() > AGGRESSIVE_AFTER {
            debug!(fingerprint = %core.fingerprint(), "broadcasting ledger request");
            core.send_request(&message);
        } else if let Some(peer) = core.least_tried_peer() {
            core.record_attempt(peer);
            core.send_request_to(&message, Some(peer));
        }
    }
}

/// Strategy for fetching a transaction set.
///
/// Transaction sets are small and urgent: every silent tick broadcasts
/// to the whole set, and the patience budget is a little longer since
/// the set may only exist on a few peers.
pub struct TxSetAcquire;

impl TxSetAcquire {
    fn request(core: &AcquireCore) -> Message {
        Message::GetTxSet(GetTxSet {
            fingerprint: core.fingerprint(),
        })
    }
}

impl AcquireStrategy for TxSetAcquire {
    fn new_peer(&mut self, core: &mut AcquireCore, peer: PeerId) {
        let message = Self::request(core);
        core.record_attempt(peer);
        core.send_request_to(&message, Some(peer));
    }

    fn on_timer(&mut self, core: &mut AcquireCore, progress: bool) {
        if progress {
            return;
        }
        if core.timeouts() >= MAX_TX_SET_TIMEOUTS {
            warn!(
                fingerprint = %core.fingerprint(),
                timeouts = core.timeouts(),
                "abandoning transaction-set acquisition"
            );
            core.mark_failed();
            return;
        }
        core.send_request(&Self::request(core));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_accept_standard_intervals() {
        // The standard intervals must sit inside the peer-set bounds.
        let overlay: Weak<dyn NodeOverlay> = {
            struct Nothing;
            impl NodeOverlay for Nothing {
                fn new_outbound_slot(&self, _: &rtx_common::PeerAddr) -> Option<crate::Slot> {
                    None
                }
                fn on_connected(&self, _: &crate::Slot, _: std::net::SocketAddr) -> bool {
                    false
                }
                fn activate(
                    &self,
                    _: &crate::Slot,
                    _: &rtx_crypto::PublicKey,
                    _: bool,
                ) -> crate::ActivateResult {
                    crate::ActivateResult::Full
                }
                fn on_closed(&self, _: crate::Slot) {}
                fn on_redirects(&self, _: &rtx_common::PeerAddr, _: Vec<rtx_common::PeerAddr>) {}
                fn add_active(&self, _: crate::PeerSession) {}
                fn get_peer_by_id(&self, _: PeerId) -> Option<crate::PeerHandle> {
                    None
                }
                fn has_peer(&self, _: PeerId) -> bool {
                    false
                }
            }
            let arc: Arc<dyn NodeOverlay> = Arc::new(Nothing);
            Arc::downgrade(&arc)
        };

        let jobs = JobQueue::new();
        let hash = Hash256::hash(b"x");
        assert!(inbound_ledger(overlay.clone(), Arc::clone(&jobs), hash).is_ok());
        assert!(tx_set(overlay, jobs, hash).is_ok());
    }
}
