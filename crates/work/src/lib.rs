//! Typed, capacity-bounded job queue for rtx-node.
//!
//! Subsystems hand the queue small closures tagged with a [`JobKind`].
//! Each kind carries an admission limit: when the number of jobs of that
//! kind already queued or running reaches the limit, further submissions
//! are refused and the caller decides what to do (typically re-arm a
//! timer and try later). The acquisition coordinators use
//! [`JobQueue::job_count_total`] to defer their own work when ledger-data
//! processing is backed up.
//!
//! Jobs run on the tokio runtime. They are expected to be short; anything
//! long-running belongs on its own task.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Classification of queued work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Processing inbound ledger data and acquisition ticks.
    LedgerData,
    /// Processing transaction-set data and acquisition ticks.
    TransactionData,
    /// Peer-overlay housekeeping.
    Overlay,
}

impl JobKind {
    /// Stable name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::LedgerData => "ledgerData",
            JobKind::TransactionData => "transactionData",
            JobKind::Overlay => "overlay",
        }
    }
}

#[derive(Default)]
struct Counts {
    by_kind: HashMap<JobKind, usize>,
}

impl Counts {
    fn finish(&mut self, kind: JobKind) {
        if let Some(count) = self.by_kind.get_mut(&kind) {
            *count = count.saturating_sub(1);
        }
    }
}

/// Capacity-bounded job queue.
pub struct JobQueue {
    counts: Arc<Mutex<Counts>>,
}

impl JobQueue {
    /// Create an empty queue.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            counts: Arc::new(Mutex::new(Counts::default())),
        })
    }

    /// Submit a job unless `kind` is already at `limit`.
    ///
    /// Returns whether the job was accepted. The count for `kind` covers
    /// both queued and running jobs and is released when the job returns.
    pub fn add_limit_job(
        &self,
        kind: JobKind,
        name: &'static str,
        limit: usize,
        job: impl FnOnce() + Send + 'static,
    ) -> bool {
        {
            let mut counts = self.counts.lock();
            let count = counts.by_kind.entry(kind).or_insert(0);
            if *count >= limit {
                trace!(kind = kind.name(), name, limit, "job refused at limit");
                return false;
            }
            *count += 1;
        }

        let counts = Arc::clone(&self.counts);
        tokio::spawn(async move {
            job();
            counts.lock().finish(kind);
        });
        true
    }

    /// Number of jobs of `kind` currently queued or running.
    pub fn job_count_total(&self, kind: JobKind) -> usize {
        self.counts
            .lock()
            .by_kind
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_jobs_run() {
        let queue = JobQueue::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let ran2 = Arc::clone(&ran);
        assert!(queue.add_limit_job(JobKind::Overlay, "tick", 2, move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        }));

        // Give the spawned task a chance to run.
        for _ in 0..50 {
            if ran.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(queue.job_count_total(JobKind::Overlay), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_limit_refuses_excess() {
        let queue = JobQueue::new();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Arc::new(Mutex::new(release_rx));

        // Two blocking jobs fill the limit.
        for _ in 0..2 {
            let rx = Arc::clone(&release_rx);
            assert!(queue.add_limit_job(JobKind::LedgerData, "blocked", 2, move || {
                let _ = rx.lock().recv();
            }));
        }
        assert_eq!(queue.job_count_total(JobKind::LedgerData), 2);

        // Third submission at the same kind is refused.
        assert!(!queue.add_limit_job(JobKind::LedgerData, "extra", 2, || {}));

        // A different kind is unaffected.
        assert!(queue.add_limit_job(JobKind::TransactionData, "other", 2, || {}));

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        for _ in 0..50 {
            if queue.job_count_total(JobKind::LedgerData) == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(queue.job_count_total(JobKind::LedgerData), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_count_by_kind() {
        let queue = JobQueue::new();
        assert_eq!(queue.job_count_total(JobKind::LedgerData), 0);

        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let rx = Arc::new(Mutex::new(rx));
        let rx2 = Arc::clone(&rx);
        assert!(queue.add_limit_job(JobKind::LedgerData, "hold", 4, move || {
            let _ = rx2.lock().recv();
        }));
        assert_eq!(queue.job_count_total(JobKind::LedgerData), 1);
        assert_eq!(queue.job_count_total(JobKind::TransactionData), 0);
        tx.send(()).unwrap();
    }
}
