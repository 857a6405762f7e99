//! Reconcile scheduler - the single consumer of reconciliation triggers
//!
//! [`ReconcileScheduler`] receives filesystem changes from the
//! [`FileWatcher`](super::watcher::FileWatcher) and explicit requests from a
//! [`ReconcileHandle`] (divergence reports from tree operations, "sync now"
//! from the daemon). Changes go through a
//! [`DebouncedChangeQueue`](super::watcher::DebouncedChangeQueue); requests
//! skip the debounce window. Either way every pass runs here, one at a time.
//!
//! ## Flow
//!
//! ```text
//! FileWatcher ──→ change_rx ──┐
//!                             ├──→ ReconcileScheduler ──→ SyncReconciler
//! ReconcileHandle ──→ req_rx ─┘          │
//!                                DebouncedChangeQueue
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::reconciler::SyncReconciler;
use crate::watcher::{ChangeEvent, DebouncedChangeQueue};

/// Pending explicit requests; one queued request is enough to trigger a run
const REQUEST_CHANNEL_CAPACITY: usize = 16;

// ============================================================================
// ReconcileHandle
// ============================================================================

/// Why a pass was requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileReason {
    /// A tree operation left disk and index disagreeing at this path
    Divergence(PathBuf),
    /// Someone asked for a pass
    Requested,
}

/// Cloneable sender for reconciliation requests
#[derive(Debug, Clone)]
pub struct ReconcileHandle {
    tx: mpsc::Sender<ReconcileReason>,
}

impl ReconcileHandle {
    /// Queues a pass without waiting
    ///
    /// Returns false only when the scheduler has stopped. A full queue
    /// already guarantees a pending pass, so the request is dropped.
    pub fn request(&self, reason: ReconcileReason) -> bool {
        match self.tx.try_send(reason) {
            Ok(()) => true,
            Err(TrySendError::Full(reason)) => {
                debug!(reason = ?reason, "Reconcile already pending");
                true
            }
            Err(TrySendError::Closed(reason)) => {
                warn!(reason = ?reason, "Reconcile scheduler is not running");
                false
            }
        }
    }
}

// ============================================================================
// ReconcileScheduler
// ============================================================================

enum Step {
    Change(ChangeEvent),
    ChangesClosed,
    Request(ReconcileReason),
    RequestsClosed,
    Tick,
    Shutdown,
}

/// Serializes every reconciliation pass
pub struct ReconcileScheduler {
    reconciler: Arc<SyncReconciler>,
    change_rx: Option<mpsc::Receiver<ChangeEvent>>,
    request_rx: Option<mpsc::Receiver<ReconcileReason>>,
    queue: DebouncedChangeQueue,
    poll_interval: Duration,
    trash_dir_name: String,
    runs: usize,
}

impl ReconcileScheduler {
    /// Creates a scheduler and the handle used to request passes
    ///
    /// `change_rx` is `None` when filesystem watching is disabled.
    pub fn new(
        reconciler: Arc<SyncReconciler>,
        change_rx: Option<mpsc::Receiver<ChangeEvent>>,
        debounce_delay: Duration,
        poll_interval: Duration,
        trash_dir_name: impl Into<String>,
    ) -> (Self, ReconcileHandle) {
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);

        info!(
            debounce_ms = debounce_delay.as_millis() as u64,
            poll_ms = poll_interval.as_millis() as u64,
            watching = change_rx.is_some(),
            "Creating reconcile scheduler"
        );

        let scheduler = Self {
            reconciler,
            change_rx,
            request_rx: Some(rx),
            queue: DebouncedChangeQueue::new(debounce_delay),
            poll_interval,
            trash_dir_name: trash_dir_name.into(),
            runs: 0,
        };
        (scheduler, ReconcileHandle { tx })
    }

    /// Adds a change to the debounce queue unless it happened inside a
    /// trash container
    pub fn enqueue(&mut self, event: ChangeEvent) {
        if event.is_inside(&self.trash_dir_name) {
            debug!(path = %event.path().display(), "Ignoring change inside trash container");
            return;
        }
        self.queue.push(event);
    }

    /// Number of passes run so far
    pub fn runs(&self) -> usize {
        self.runs
    }

    async fn recv_or_pending<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
        match rx {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    async fn run_pass(&mut self, trigger: &str) {
        self.queue.drain();
        self.runs += 1;
        match self.reconciler.reconcile().await {
            Ok(report) => info!(
                trigger,
                created = report.created_count,
                missing = report.missing.len(),
                skipped = report.skipped.len(),
                "Background reconciliation complete"
            ),
            Err(e) => warn!(trigger, error = %e, "Background reconciliation failed"),
        }
    }

    /// Main loop
    ///
    /// Returns when `shutdown` fires, or when both input channels have closed
    /// (after a final pass if changes were still pending).
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!("Reconcile scheduler starting");
        let mut poll_timer = tokio::time::interval(self.poll_interval);

        loop {
            let step = tokio::select! {
                _ = shutdown.cancelled() => Step::Shutdown,
                change = Self::recv_or_pending(&mut self.change_rx) => match change {
                    Some(event) => Step::Change(event),
                    None => Step::ChangesClosed,
                },
                request = Self::recv_or_pending(&mut self.request_rx) => match request {
                    Some(reason) => Step::Request(reason),
                    None => Step::RequestsClosed,
                },
                _ = poll_timer.tick() => Step::Tick,
            };

            match step {
                Step::Shutdown => {
                    info!(pending = self.queue.pending_count(), "Shutdown requested");
                    break;
                }
                Step::Change(event) => self.enqueue(event),
                Step::ChangesClosed => {
                    info!("Change channel closed");
                    self.change_rx = None;
                }
                Step::Request(reason) => {
                    info!(reason = ?reason, "Reconciliation requested");
                    self.run_pass("request").await;
                }
                Step::RequestsClosed => {
                    debug!("Request channel closed");
                    self.request_rx = None;
                }
                Step::Tick => {
                    let settled = self.queue.poll();
                    if !settled.is_empty() {
                        info!(count = settled.len(), "Settled changes ready for reconciliation");
                        self.run_pass("changes").await;
                    }
                }
            }

            if self.change_rx.is_none() && self.request_rx.is_none() {
                if !self.queue.is_empty() {
                    self.run_pass("flush").await;
                }
                break;
            }
        }

        info!(runs = self.runs, "Reconcile scheduler stopped");
    }
}
