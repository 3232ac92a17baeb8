//! Per-queue throughput counters and interval snapshots
//!
//! A [`StatsRecorder`] pairs two atomic totals (tasks received, tasks
//! processed) with a ring buffer of [`Snapshot`]s, each covering one
//! sampling interval. Snapshots are deltas, so absolute totals never leak
//! into the exported history. The processed total is speculative at the
//! dequeue site: it is incremented before the wait and reconciled with a
//! decrement when the wait is cancelled, times out, or fails.

use crate::config::DEFAULT_HISTORY_DEPTH;
use crate::ring::RingBuffer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Received/processed deltas over one sampling interval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// Interval start (the previous snapshot's end, or recorder creation)
    pub start: DateTime<Utc>,
    /// Interval end (snapshot time)
    pub end: DateTime<Utc>,
    /// Tasks received during the interval
    pub received: i64,
    /// Tasks processed during the interval
    pub processed: i64,
}

struct SnapState {
    last_time: DateTime<Utc>,
    last_received: i64,
    last_processed: i64,
}

/// Counters and snapshot history for one queue
///
/// One recorder per queue, sharing its lifetime. Counter increments are
/// lock-free; `snapshot()` holds a short mutex over the previous-interval
/// state and must be serialized per recorder, which the sampler does by
/// construction (one scheduler task walks all recorders).
pub struct StatsRecorder {
    name: String,
    worker_count: usize,
    capacity: usize,
    received: AtomicI64,
    processed: AtomicI64,
    snap_state: Mutex<SnapState>,
    history: RingBuffer<Snapshot>,
}

impl StatsRecorder {
    /// Create a recorder for the named queue
    pub fn new(name: impl Into<String>, worker_count: usize, capacity: usize) -> Self {
        Self::with_history_depth(name, worker_count, capacity, DEFAULT_HISTORY_DEPTH)
    }

    /// Create a recorder with a custom snapshot history depth
    pub fn with_history_depth(
        name: impl Into<String>,
        worker_count: usize,
        capacity: usize,
        history_depth: usize,
    ) -> Self {
        Self {
            name: name.into(),
            worker_count,
            capacity,
            received: AtomicI64::new(0),
            processed: AtomicI64::new(0),
            snap_state: Mutex::new(SnapState {
                last_time: Utc::now(),
                last_received: 0,
                last_processed: 0,
            }),
            history: RingBuffer::new(history_depth),
        }
    }

    /// Name of the owning queue
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured worker count of the owning queue
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Configured per-slot capacity of the owning queue
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add to the received-task total
    pub fn record_received(&self, n: i64) {
        self.received.fetch_add(n, Ordering::Relaxed);
    }

    /// Add to the processed-task total
    ///
    /// Negative values are used only for speculative-count reconciliation
    /// at the dequeue site.
    pub fn record_processed(&self, n: i64) {
        self.processed.fetch_add(n, Ordering::Relaxed);
    }

    /// Current received-task total
    pub fn received_total(&self) -> i64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Current processed-task total
    pub fn processed_total(&self) -> i64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Speculatively count one processed task, reconciled on drop
    ///
    /// The returned guard decrements the total again unless
    /// [`InFlight::commit`] is called, so a cancelled or failed wait nets
    /// to zero no matter where the future is dropped.
    pub(crate) fn begin_processed(&self) -> InFlight<'_> {
        self.record_processed(1);
        InFlight {
            recorder: self,
            committed: false,
        }
    }

    fn snap_state(&self) -> MutexGuard<'_, SnapState> {
        self.snap_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the deltas since the previous snapshot into the history
    ///
    /// The interval runs from the previous call's end (or recorder
    /// creation) to now. The oldest snapshot is evicted once the history
    /// is full. Returns the snapshot that was recorded.
    pub fn snapshot(&self) -> Snapshot {
        let mut state = self.snap_state();
        let end = Utc::now();
        let received = self.received_total();
        let processed = self.processed_total();
        let snap = Snapshot {
            start: state.last_time,
            end,
            received: received - state.last_received,
            processed: processed - state.last_processed,
        };
        state.last_time = end;
        state.last_received = received;
        state.last_processed = processed;
        self.history.enqueue(snap.clone());
        snap
    }

    /// Pop all buffered snapshots, oldest first, leaving the history empty
    pub fn drain_snapshots(&self) -> Vec<Snapshot> {
        let mut snaps = Vec::with_capacity(self.history.len());
        while let Ok(snap) = self.history.dequeue() {
            snaps.push(snap);
        }
        snaps
    }

    /// Number of snapshots currently buffered
    pub fn snapshot_count(&self) -> usize {
        self.history.len()
    }
}

/// Drop guard for a speculative processed count
pub(crate) struct InFlight<'a> {
    recorder: &'a StatsRecorder,
    committed: bool,
}

impl InFlight<'_> {
    /// Keep the speculative increment: the wait produced a task
    pub(crate) fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.recorder.record_processed(-1);
        }
    }
}
