//! Integration tests for the acquisition coordinator: peer admission,
//! request fan-out, the timer loop, and load-aware deferral.

mod support;

use parking_lot::Mutex;
use rtx_common::Hash256;
use rtx_overlay::{
    acquire, AcquireCore, AcquireStrategy, Message, PeerId, PeerSet,
};
use rtx_work::{JobKind, JobQueue};
use std::sync::Arc;
use std::time::Duration;
use support::MockOverlay;

/// Strategy double that records every hook invocation.
#[derive(Clone, Default)]
struct Recording {
    new_peers: Arc<Mutex<Vec<PeerId>>>,
    ticks: Arc<Mutex<Vec<(bool, u32)>>>,
    complete_after_ticks: Option<usize>,
}

impl AcquireStrategy for Recording {
    fn new_peer(&mut self, _core: &mut AcquireCore, peer: PeerId) {
        self.new_peers.lock().push(peer);
    }

    fn on_timer(&mut self, core: &mut AcquireCore, progress: bool) {
        let mut ticks = self.ticks.lock();
        ticks.push((progress, core.timeouts()));
        if let Some(limit) = self.complete_after_ticks {
            if ticks.len() >= limit {
                core.mark_complete();
            }
        }
    }
}

fn make_set(
    mock: &Arc<MockOverlay>,
    jobs: Arc<JobQueue>,
    interval_ms: u64,
    txn_data: bool,
    strategy: Recording,
) -> PeerSet {
    PeerSet::new(
        support::overlay_weak(mock),
        jobs,
        Hash256::hash(b"wanted artifact"),
        interval_ms,
        txn_data,
        Box::new(strategy),
    )
    .expect("valid interval")
}

async fn wait_for<F: Fn() -> bool>(pred: F, what: &str) {
    for _ in 0..1000 {
        if pred() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn test_peer_has_is_idempotent() {
    let mock = MockOverlay::new();
    let strategy = Recording::default();
    let new_peers = Arc::clone(&strategy.new_peers);
    let set = make_set(&mock, JobQueue::new(), 250, false, strategy);

    let _rx = mock.add_peer(PeerId(1));
    set.peer_has(PeerId(1));
    set.peer_has(PeerId(1));

    assert_eq!(new_peers.lock().as_slice(), &[PeerId(1)]);
    assert_eq!(set.peer_count(), 1);
}

#[tokio::test]
async fn test_bad_peer_then_readmit() {
    let mock = MockOverlay::new();
    let strategy = Recording::default();
    let new_peers = Arc::clone(&strategy.new_peers);
    let set = make_set(&mock, JobQueue::new(), 250, false, strategy);

    let _rx = mock.add_peer(PeerId(1));
    set.peer_has(PeerId(1));
    set.bad_peer(PeerId(1));
    set.peer_has(PeerId(1));

    // Observable state matches a single admission.
    assert_eq!(set.peer_count(), 1);
    // The hook fired once per first-time admission.
    assert_eq!(new_peers.lock().as_slice(), &[PeerId(1), PeerId(1)]);
}

#[tokio::test]
async fn test_peer_count_intersects_overlay() {
    let mock = MockOverlay::new();
    let set = make_set(&mock, JobQueue::new(), 250, false, Recording::default());

    let _rx = mock.add_peer(PeerId(1));
    set.peer_has(PeerId(1));
    set.peer_has(PeerId(2)); // never known to the overlay

    assert_eq!(set.peer_count(), 1);

    mock.drop_peer(PeerId(1));
    assert_eq!(set.peer_count(), 0);
}

#[tokio::test]
async fn test_take_peer_set_from() {
    let mock = MockOverlay::new();
    let source = make_set(&mock, JobQueue::new(), 250, false, Recording::default());
    let target = make_set(&mock, JobQueue::new(), 250, false, Recording::default());

    let _rx1 = mock.add_peer(PeerId(1));
    source.peer_has(PeerId(1));
    source.peer_has(PeerId(2)); // unknown to the overlay

    let copied = target.take_peer_set_from(&source);
    assert_eq!(copied, 2);
    // Only overlay-known peers count.
    assert_eq!(target.peer_count(), 1);
}

#[tokio::test]
async fn test_broadcast_and_unicast() {
    let mock = MockOverlay::new();
    let set = make_set(&mock, JobQueue::new(), 250, false, Recording::default());

    let mut rx_a = mock.add_peer(PeerId(1));
    let mut rx_b = mock.add_peer(PeerId(2));
    set.peer_has(PeerId(1));
    set.peer_has(PeerId(2));
    // Drain the probes sent by new_peer admission (none for Recording).

    let msg = Message::GetLedger(rtx_overlay::messages::GetLedger::base(set.fingerprint()));

    set.send_request(&msg);
    assert_eq!(rx_a.try_recv().unwrap(), msg);
    assert_eq!(rx_b.try_recv().unwrap(), msg);

    set.send_request_to(&msg, Some(PeerId(1)));
    assert_eq!(rx_a.try_recv().unwrap(), msg);
    assert!(rx_b.try_recv().is_err());

    // Null peer falls back to broadcast.
    set.send_request_to(&msg, None);
    assert_eq!(rx_a.try_recv().unwrap(), msg);
    assert_eq!(rx_b.try_recv().unwrap(), msg);
}

#[tokio::test(start_paused = true)]
async fn test_timer_progress_and_timeout_ticks() {
    let mock = MockOverlay::new();
    let strategy = Recording::default();
    let ticks = Arc::clone(&strategy.ticks);
    let set = make_set(&mock, JobQueue::new(), 1000, false, strategy);

    let _rx_a = mock.add_peer(PeerId(1));
    let _rx_b = mock.add_peer(PeerId(2));
    set.peer_has(PeerId(1));
    set.peer_has(PeerId(2));

    // Bytes arrived before the first tick.
    set.note_progress();
    set.start();

    wait_for(|| ticks.lock().len() >= 1, "first tick").await;
    assert_eq!(ticks.lock()[0], (true, 0));
    assert_eq!(set.timeouts(), 0);

    // No bytes before the second tick: it is charged as a timeout.
    wait_for(|| ticks.lock().len() >= 2, "second tick").await;
    assert_eq!(ticks.lock()[1], (false, 1));
    assert_eq!(set.timeouts(), 1);
    assert!(set.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_done_set_stops_ticking() {
    let mock = MockOverlay::new();
    let strategy = Recording {
        complete_after_ticks: Some(1),
        ..Recording::default()
    };
    let ticks = Arc::clone(&strategy.ticks);
    let set = make_set(&mock, JobQueue::new(), 100, false, strategy);

    set.start();
    wait_for(|| ticks.lock().len() >= 1, "first tick").await;
    assert!(set.is_complete());
    assert!(!set.is_active());

    // Plenty of virtual time: no further ticks, no re-armed timer.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(ticks.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_arms_one_timer() {
    let mock = MockOverlay::new();
    let strategy = Recording::default();
    let ticks = Arc::clone(&strategy.ticks);
    let set = make_set(&mock, JobQueue::new(), 100, false, strategy);

    set.start();
    set.start();

    tokio::time::sleep(Duration::from_millis(150)).await;
    wait_for(|| !ticks.lock().is_empty(), "first tick").await;
    // A doubled timer would produce two ticks in the first interval.
    assert_eq!(ticks.lock().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_ledger_ticks_defer_under_load() {
    let mock = MockOverlay::new();
    let jobs = JobQueue::new();
    let strategy = Recording::default();
    let ticks = Arc::clone(&strategy.ticks);
    let set = make_set(&mock, Arc::clone(&jobs), 50, false, strategy);

    // Saturate the ledger-data lane with five stuck jobs.
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let release_rx = Arc::new(Mutex::new(release_rx));
    for _ in 0..5 {
        let rx = Arc::clone(&release_rx);
        assert!(jobs.add_limit_job(JobKind::LedgerData, "stuck", 8, move || {
            let _ = rx.lock().recv();
        }));
    }
    assert!(jobs.job_count_total(JobKind::LedgerData) > 4);

    set.start();
    tokio::time::sleep(Duration::from_millis(300)).await;
    // Every tick so far was deferred, not run.
    assert!(ticks.lock().is_empty());

    for _ in 0..5 {
        release_tx.send(()).unwrap();
    }
    wait_for(|| !ticks.lock().is_empty(), "tick after load drains").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_txn_ticks_are_not_deferred() {
    let mock = MockOverlay::new();
    let jobs = JobQueue::new();
    let strategy = Recording::default();
    let ticks = Arc::clone(&strategy.ticks);
    let set = make_set(&mock, Arc::clone(&jobs), 50, true, strategy);

    // Ledger-data load does not gate transaction-data ticks.
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let release_rx = Arc::new(Mutex::new(release_rx));
    for _ in 0..5 {
        let rx = Arc::clone(&release_rx);
        assert!(jobs.add_limit_job(JobKind::LedgerData, "stuck", 8, move || {
            let _ = rx.lock().recv();
        }));
    }

    set.start();
    wait_for(|| !ticks.lock().is_empty(), "txn tick under ledger load").await;

    for _ in 0..5 {
        release_tx.send(()).unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_ledger_acquire_escalates_and_fails() {
    let mock = MockOverlay::new();
    let jobs = JobQueue::new();
    let set = acquire::inbound_ledger(support::overlay_weak(&mock), jobs, Hash256::hash(b"missing ledger"))
        .expect("valid interval");

    let mut rx = mock.add_peer(PeerId(7));
    set.peer_has(PeerId(7));

    // Admission sends an immediate unicast probe.
    let probe = rx.recv().await.expect("probe");
    assert!(matches!(probe, Message::GetLedger(_)));

    set.start();

    // With no progress ever, the set retries and eventually abandons.
    wait_for(|| set.is_failed(), "acquisition abandoned").await;
    assert!(!set.is_active());
    assert!(set.timeouts() >= acquire::MAX_LEDGER_TIMEOUTS);

    // The silent ticks produced further requests before giving up.
    let mut requests = 0;
    while rx.try_recv().is_ok() {
        requests += 1;
    }
    assert!(requests > 0);
}
