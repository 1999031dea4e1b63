// =============================================================================
// STALL MONITOR
// =============================================================================
// Runs the classification loop over the snapshot stream.
//
// OWNERSHIP:
// One task owns the StallMonitor, and with it the Deduplicator. Each snapshot
// is fully processed (classified, deduplicated, notification queued) before
// the next one is taken, so snapshots of the same stall are never processed
// concurrently and the dedup set needs no lock.
//
// OUTPUTS:
// - TheftNotification on the notification channel, once per stolen run
// - StallBoard: the latest classified snapshot per stall, plus stream health,
//   read by the presentation layer. In `BoardMode::Replace` every batch is
//   the complete set of stalls and stalls missing from it leave the board.
//
// LIFECYCLE:
// `subscribe` moves the monitor into a task and returns a Subscription.
// `Subscription::unsubscribe` stops the task and hands the monitor back.
// A source error halts the loop and leaves a diagnostic on the board.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dedup::{DedupDecision, DedupEffect, Deduplicator};
use crate::error::StreamError;
use crate::metrics;
use crate::models::{ClassifiedStall, StallSnapshot, StreamHealth};
use crate::notify::{Notifier, TheftNotification};

/// One delivery from the stream source
pub type SnapshotBatch = Result<Vec<StallSnapshot>, StreamError>;

// =============================================================================
// STALL BOARD
// =============================================================================
// Read-only view for the presentation layer. Cloning shares the same board.
// -----------------------------------------------------------------------------

/// How a batch updates the board
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoardMode {
    /// Batches carry changed stalls only; unseen stalls keep their last state
    #[default]
    Upsert,
    /// Batches carry every stall; stalls missing from a batch are dropped
    Replace,
}

#[derive(Debug, Clone, Default)]
pub struct StallBoard {
    inner: Arc<RwLock<BoardState>>,
    mode: BoardMode,
}

#[derive(Debug, Default)]
struct BoardState {
    stalls: HashMap<String, ClassifiedStall>,
    halted: bool,
    error: Option<String>,
}

impl StallBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: BoardMode) -> Self {
        Self {
            inner: Arc::default(),
            mode,
        }
    }

    pub fn mode(&self) -> BoardMode {
        self.mode
    }

    /// Latest state of every stall seen so far, most recently updated first.
    /// Stalls with an unknown update time come last.
    pub async fn stalls(&self) -> Vec<ClassifiedStall> {
        let state = self.inner.read().await;
        let mut stalls: Vec<ClassifiedStall> = state.stalls.values().cloned().collect();
        stalls.sort_by(|a, b| {
            b.snapshot
                .last_updated
                .cmp(&a.snapshot.last_updated)
                .then_with(|| a.snapshot.stall_path.cmp(&b.snapshot.stall_path))
        });
        stalls
    }

    pub async fn health(&self) -> StreamHealth {
        let state = self.inner.read().await;
        StreamHealth {
            live: !state.halted,
            error: state.error.clone(),
        }
    }

    async fn upsert(&self, stall: ClassifiedStall) {
        let mut state = self.inner.write().await;
        state.stalls.insert(stall.snapshot.stall_path.clone(), stall);
    }

    /// Drop every stall whose path is not in `delivered`
    async fn retain_only(&self, delivered: &HashSet<String>) {
        let mut state = self.inner.write().await;
        let before = state.stalls.len();
        state.stalls.retain(|path, _| delivered.contains(path));

        let removed = before - state.stalls.len();
        if removed > 0 {
            debug!(removed, "Stalls missing from the full batch left the board");
        }
    }

    async fn halt(&self, error: Option<String>) {
        let mut state = self.inner.write().await;
        state.halted = true;
        if error.is_some() {
            state.error = error;
        }
    }
}

// =============================================================================
// MONITOR
// =============================================================================
pub struct StallMonitor {
    dedup: Deduplicator,
    notifier: Notifier,
    board: StallBoard,
}

impl StallMonitor {
    pub fn new(notifier: Notifier, board: StallBoard) -> Self {
        Self {
            dedup: Deduplicator::new(),
            notifier,
            board,
        }
    }

    pub fn deduplicator(&self) -> &Deduplicator {
        &self.dedup
    }

    pub fn board(&self) -> &StallBoard {
        &self.board
    }

    /// Process one snapshot to completion
    pub async fn process(&mut self, snapshot: StallSnapshot) -> DedupDecision {
        let decision = self.dedup.on_snapshot(&snapshot);
        metrics::record_snapshot(decision.state);

        if decision.should_fire_theft_alert {
            metrics::record_theft_alert();
            warn!(
                stall_path = %snapshot.stall_path,
                location_id = %snapshot.location_id,
                stall_id = %snapshot.stall_id,
                "Theft detected"
            );
            let delivered = self
                .notifier
                .notify(TheftNotification::from_snapshot(&snapshot))
                .await;
            if !delivered {
                metrics::record_notification_dropped();
                error!(
                    stall_path = %snapshot.stall_path,
                    "Theft alert fired but no consumer received it"
                );
            }
        } else if decision.effect == DedupEffect::Remove {
            info!(
                stall_path = %snapshot.stall_path,
                state = decision.state.as_str(),
                "Theft condition cleared"
            );
        }
        metrics::set_dedup_active(self.dedup.len());

        self.board
            .upsert(ClassifiedStall {
                snapshot,
                state: decision.state,
            })
            .await;

        decision
    }

    /// Process a batch in delivery order
    pub async fn process_batch(&mut self, batch: Vec<StallSnapshot>) -> Vec<DedupDecision> {
        let mut decisions = Vec::with_capacity(batch.len());
        let mut delivered = HashSet::with_capacity(batch.len());
        for snapshot in batch {
            delivered.insert(snapshot.stall_path.clone());
            decisions.push(self.process(snapshot).await);
        }

        if self.board.mode == BoardMode::Replace {
            self.board.retain_only(&delivered).await;
        }
        decisions
    }

    /// Start consuming `source` on a dedicated task
    pub fn subscribe(self, source: mpsc::Receiver<SnapshotBatch>) -> Subscription {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run(self, source, shutdown_rx));

        Subscription {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

async fn run(
    mut monitor: StallMonitor,
    mut source: mpsc::Receiver<SnapshotBatch>,
    mut shutdown: oneshot::Receiver<()>,
) -> StallMonitor {
    info!("Snapshot subscription started");

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Snapshot subscription cancelled");
                monitor.board.halt(None).await;
                break;
            }

            batch = source.recv() => match batch {
                Some(Ok(snapshots)) => {
                    debug!(count = snapshots.len(), "Processing snapshot batch");
                    monitor.process_batch(snapshots).await;
                }
                Some(Err(err)) => {
                    metrics::record_stream_error();
                    error!(error = %err, "Snapshot subscription failed; halting updates");
                    monitor.board.halt(Some(err.to_string())).await;
                    break;
                }
                None => {
                    info!("Snapshot source closed");
                    monitor.board.halt(None).await;
                    break;
                }
            }
        }
    }

    monitor
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================
/// Handle to a running classification loop. Dropping it aborts the loop.
pub struct Subscription {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<StallMonitor>>,
}

impl Subscription {
    /// Stop delivering snapshots and return the monitor with its dedup
    /// state. `None` if the loop task panicked.
    pub async fn unsubscribe(mut self) -> Option<StallMonitor> {
        if let Some(shutdown) = self.shutdown.take() {
            // The loop may already have stopped on its own
            let _ = shutdown.send(());
        }

        let handle = self.handle.take()?;
        match handle.await {
            Ok(monitor) => Some(monitor),
            Err(err) => {
                error!(error = %err, "Snapshot loop terminated abnormally");
                None
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
