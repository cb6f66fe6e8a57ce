//! Multi-peer acquisition coordination.
//!
//! A [`PeerSet`] drives the retrieval of one content-addressed artifact
//! (a ledger or a transaction set, named by its fingerprint) from an
//! uncertain set of remote peers. It keeps the peer ids believed to have
//! the artifact and a periodic timer; on each tick it either observes
//! progress (bytes arrived since the last tick) or charges a timeout and
//! lets the injected [`AcquireStrategy`] escalate.
//!
//! Locking: one mutex per set, held across the whole tick including the
//! strategy hooks. Hooks receive the locked [`AcquireCore`] directly and
//! may call back into `send_request` freely, but must not block on I/O;
//! sends are fire-and-forget.
//!
//! Timer discipline: at most one timer is armed per set; a set that has
//! declared itself complete or failed never arms another. Timer
//! callbacks hold only a weak reference, so a set dropped while a timer
//! is in flight makes the callback a silent no-op.

use crate::messages::Message;
use crate::{NodeOverlay, OverlayError, PeerId, Result};
use parking_lot::Mutex;
use rtx_common::Hash256;
use rtx_work::{JobKind, JobQueue};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Ledger-data ticks are deferred while more than this many ledger-data
/// jobs are in flight.
pub const LEDGER_DATA_DEFER_THRESHOLD: usize = 4;

/// Admission limit for tick jobs of either kind.
const TICK_JOB_LIMIT: usize = 2;

/// Lower bound (exclusive) on the timer interval, in milliseconds.
pub const MIN_INTERVAL_MS: u64 = 10;

/// Upper bound (exclusive) on the timer interval, in milliseconds.
pub const MAX_INTERVAL_MS: u64 = 30_000;

/// Variant behavior injected into a [`PeerSet`].
///
/// Hooks are invoked with the set's lock held; they may mutate the core
/// and send requests, but must not block.
pub trait AcquireStrategy: Send + 'static {
    /// A peer was admitted to the set for the first time.
    fn new_peer(&mut self, core: &mut AcquireCore, peer: PeerId);

    /// A tick fired. `progress` reports whether bytes arrived since the
    /// previous tick; when false, the timeout counter has already been
    /// incremented.
    fn on_timer(&mut self, core: &mut AcquireCore, progress: bool);

    /// Whether acquisition is over. The default consults the core's
    /// completion flags.
    fn done(&self, core: &AcquireCore) -> bool {
        core.is_done()
    }
}

/// The locked state of a [`PeerSet`], exposed to strategy hooks.
pub struct AcquireCore {
    fingerprint: Hash256,
    interval: Duration,
    timeouts: u32,
    progress: bool,
    complete: bool,
    failed: bool,
    txn_data: bool,
    peers: HashMap<PeerId, u32>,
    timer_armed: bool,
    overlay: Weak<dyn NodeOverlay>,
    // Taken while a hook runs so the hook can borrow the core mutably.
    strategy: Option<Box<dyn AcquireStrategy>>,
}

impl AcquireCore {
    /// Fingerprint of the artifact being acquired.
    pub fn fingerprint(&self) -> Hash256 {
        self.fingerprint
    }

    /// Timeout ticks charged so far. Monotonically non-decreasing.
    pub fn timeouts(&self) -> u32 {
        self.timeouts
    }

    /// Whether this set acquires transaction data.
    pub fn is_txn_data(&self) -> bool {
        self.txn_data
    }

    /// Whether the artifact has been fully acquired.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Whether acquisition has been abandoned.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Complete or failed.
    pub fn is_done(&self) -> bool {
        self.complete || self.failed
    }

    /// Declare the artifact acquired. A set that already failed stays
    /// failed.
    pub fn mark_complete(&mut self) {
        if !self.failed {
            self.complete = true;
        }
    }

    /// Abandon acquisition. A set that already completed stays complete.
    pub fn mark_failed(&mut self) {
        if !self.complete {
            self.failed = true;
        }
    }

    /// Record that bytes arrived for this artifact.
    pub fn note_progress(&mut self) {
        self.progress = true;
    }

    /// Ids currently in the set, in no particular order.
    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.keys().copied().collect()
    }

    /// Number of admitted peers the overlay still knows.
    pub fn peer_count(&self) -> usize {
        let Some(overlay) = self.overlay.upgrade() else {
            return 0;
        };
        self.peers
            .keys()
            .filter(|id| overlay.has_peer(**id))
            .count()
    }

    /// Bump the request count for a peer. Returns the new count.
    pub fn record_attempt(&mut self, peer: PeerId) -> u32 {
        let count = self.peers.entry(peer).or_insert(0);
        *count += 1;
        *count
    }

    /// The peer in the set with the fewest recorded attempts.
    pub fn least_tried_peer(&self) -> Option<PeerId> {
        self.peers
            .iter()
            .min_by_key(|(id, count)| (**count, id.0))
            .map(|(id, _)| *id)
    }

    /// Broadcast a request to every peer in the set. A set with no peers
    /// sends nothing.
    pub fn send_request(&self, message: &Message) {
        if self.peers.is_empty() {
            return;
        }
        let Some(overlay) = self.overlay.upgrade() else {
            return;
        };
        for id in self.peers.keys() {
            if let Some(handle) = overlay.get_peer_by_id(*id) {
                handle.send(message.clone());
            }
        }
    }

    /// Unicast a request; `None` falls back to broadcast.
    pub fn send_request_to(&self, message: &Message, peer: Option<PeerId>) {
        let Some(peer) = peer else {
            return self.send_request(message);
        };
        let Some(overlay) = self.overlay.upgrade() else {
            return;
        };
        if let Some(handle) = overlay.get_peer_by_id(peer) {
            handle.send(message.clone());
        }
    }
}

struct PeerSetShared {
    core: Mutex<AcquireCore>,
    jobs: Arc<JobQueue>,
}

/// Timer-driven acquisition coordinator for one artifact.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct PeerSet {
    shared: Arc<PeerSetShared>,
}

impl PeerSet {
    /// Create a set for `fingerprint`, ticking every `interval_ms`.
    ///
    /// The interval must lie strictly inside
    /// (`MIN_INTERVAL_MS`, `MAX_INTERVAL_MS`). The timer is not armed
    /// until [`PeerSet::start`].
    pub fn new(
        overlay: Weak<dyn NodeOverlay>,
        jobs: Arc<JobQueue>,
        fingerprint: Hash256,
        interval_ms: u64,
        txn_data: bool,
        strategy: Box<dyn AcquireStrategy>,
    ) -> Result<Self> {
        if interval_ms <= MIN_INTERVAL_MS || interval_ms >= MAX_INTERVAL_MS {
            return Err(OverlayError::BadTimerInterval(interval_ms));
        }

        Ok(Self {
            shared: Arc::new(PeerSetShared {
                core: Mutex::new(AcquireCore {
                    fingerprint,
                    interval: Duration::from_millis(interval_ms),
                    timeouts: 0,
                    // Starts true so the first tick is not charged as a
                    // timeout.
                    progress: true,
                    complete: false,
                    failed: false,
                    txn_data,
                    peers: HashMap::new(),
                    timer_armed: false,
                    overlay,
                    strategy: Some(strategy),
                }),
                jobs,
            }),
        })
    }

    /// Arm the first timer.
    pub fn start(&self) {
        Self::arm_timer(&self.shared);
    }

    /// Admit a peer to the set. Idempotent: re-adding a known peer is a
    /// no-op; the strategy's `new_peer` hook fires only on first
    /// admission.
    pub fn peer_has(&self, peer: PeerId) {
        let mut core = self.shared.core.lock();
        if core.peers.contains_key(&peer) {
            return;
        }
        core.peers.insert(peer, 0);
        trace!(fingerprint = %core.fingerprint, %peer, "peer admitted");

        let mut strategy = core.strategy.take().expect("strategy present outside hooks");
        strategy.new_peer(&mut core, peer);
        core.strategy = Some(strategy);
    }

    /// Remove a peer from the set.
    pub fn bad_peer(&self, peer: PeerId) {
        let mut core = self.shared.core.lock();
        if core.peers.remove(&peer).is_some() {
            trace!(fingerprint = %core.fingerprint, %peer, "peer removed");
        }
    }

    /// Broadcast a request to every current peer.
    pub fn send_request(&self, message: &Message) {
        self.shared.core.lock().send_request(message);
    }

    /// Unicast a request; `None` broadcasts.
    pub fn send_request_to(&self, message: &Message, peer: Option<PeerId>) {
        self.shared.core.lock().send_request_to(message, peer);
    }

    /// Replace this set's peers with a copy of another set's, counters
    /// reset. Returns the new set size.
    pub fn take_peer_set_from(&self, other: &PeerSet) -> usize {
        // Collect before locking self so the two locks never nest.
        let ids = {
            let other_core = other.shared.core.lock();
            other_core.peer_ids()
        };

        let mut core = self.shared.core.lock();
        core.peers = ids.into_iter().map(|id| (id, 0)).collect();
        core.peers.len()
    }

    /// Whether acquisition is still in flight.
    pub fn is_active(&self) -> bool {
        !self.shared.core.lock().is_done()
    }

    /// Number of admitted peers the overlay still knows.
    pub fn peer_count(&self) -> usize {
        self.shared.core.lock().peer_count()
    }

    /// Record that bytes arrived for this artifact since the last tick.
    pub fn note_progress(&self) {
        self.shared.core.lock().note_progress();
    }

    /// Fingerprint of the artifact being acquired.
    pub fn fingerprint(&self) -> Hash256 {
        self.shared.core.lock().fingerprint()
    }

    /// Timeout ticks charged so far.
    pub fn timeouts(&self) -> u32 {
        self.shared.core.lock().timeouts()
    }

    /// Whether the artifact has been fully acquired.
    pub fn is_complete(&self) -> bool {
        self.shared.core.lock().is_complete()
    }

    /// Whether acquisition has been abandoned.
    pub fn is_failed(&self) -> bool {
        self.shared.core.lock().is_failed()
    }

    /// Run one tick under the lock: progress bookkeeping, strategy hook,
    /// and re-arm.
    fn invoke_on_timer(shared: &Arc<PeerSetShared>) {
        let mut core = shared.core.lock();
        let mut strategy = core.strategy.take().expect("strategy present outside hooks");

        if strategy.done(&core) {
            core.strategy = Some(strategy);
            return;
        }

        if !core.progress {
            core.timeouts += 1;
            warn!(
                fingerprint = %core.fingerprint,
                timeouts = core.timeouts,
                peers = core.peers.len(),
                "no progress acquiring artifact"
            );
            strategy.on_timer(&mut core, false);
        } else {
            core.progress = false;
            strategy.on_timer(&mut core, true);
        }

        let done = strategy.done(&core);
        core.strategy = Some(strategy);
        drop(core);

        if !done {
            Self::arm_timer(shared);
        }
    }

    /// Arm the tick timer, unless one is already armed or the set is
    /// done.
    fn arm_timer(shared: &Arc<PeerSetShared>) {
        let interval = {
            let mut core = shared.core.lock();
            if core.timer_armed || core.is_done() {
                return;
            }
            core.timer_armed = true;
            core.interval
        };

        let weak = Arc::downgrade(shared);
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            // A set dropped while the timer was in flight: silently done.
            let Some(shared) = weak.upgrade() else {
                return;
            };
            Self::timer_entry(shared);
        });
    }

    /// Timer fired: dispatch the tick as a job, deferring ledger-data
    /// work while the job queue is loaded. Transaction-data ticks are
    /// never deferred.
    fn timer_entry(shared: Arc<PeerSetShared>) {
        let txn_data = {
            let mut core = shared.core.lock();
            core.timer_armed = false;
            if core.is_done() {
                return;
            }
            core.txn_data
        };

        let kind = if txn_data {
            JobKind::TransactionData
        } else {
            let in_flight = shared.jobs.job_count_total(JobKind::LedgerData);
            if in_flight > LEDGER_DATA_DEFER_THRESHOLD {
                debug!(in_flight, "deferring acquisition tick due to load");
                Self::arm_timer(&shared);
                return;
            }
            JobKind::LedgerData
        };

        let jobs = Arc::clone(&shared.jobs);
        let job_shared = Arc::clone(&shared);
        let accepted = jobs.add_limit_job(kind, "timerEntry", TICK_JOB_LIMIT, move || {
            PeerSet::invoke_on_timer(&job_shared);
        });
        if !accepted {
            // Tick refused at the admission limit; try again next
            // interval rather than dropping the loop.
            Self::arm_timer(&shared);
        }
    }
}
