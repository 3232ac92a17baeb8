//! Bounded multi-queue dispatch with sequence routing and worker affinity
//!
//! A [`DispatchQueue`] fronts one logical task stream with N independently
//! bounded slots, each drained by a dedicated worker task running a
//! caller-supplied [`Worker::svc`] pass in a loop until shutdown. Enqueue
//! routes by sequence number and never blocks: a full slot hands the task
//! back as backpressure. Dequeue goes through a [`WorkerHandle`] bound to
//! exactly one slot for its lifetime.

use crate::affinity::{slot_for, AffinityStrategy, RoundRobinAffinity};
use crate::config::QueueConfig;
use crate::error::{DispatchError, Result};
use crate::registry::{QueueHandle, QueueRegistry};
use crate::stats::StatsRecorder;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Caller-supplied processing routine
///
/// Each worker task runs `svc` in a loop until shutdown. One call is one
/// pass: it should dequeue through the handle and process what it gets.
/// Task semantics, including error handling, belong entirely to the
/// implementation; the queue does not retry or restart a failed pass.
#[async_trait]
pub trait Worker<T>: Send + Sync {
    async fn svc(&self, queue: &WorkerHandle<T>);
}

/// Signal that an enqueue did not take place, carrying the task back
///
/// This is expected backpressure, not an error: the caller decides whether
/// to retry, shed load, or reject upstream.
pub enum EnqueueRejected<T> {
    /// The target slot is at capacity
    Full(T),
    /// The queue has been shut down
    Stopped(T),
}

impl<T> EnqueueRejected<T> {
    /// Recover the task that was not enqueued
    pub fn into_task(self) -> T {
        match self {
            Self::Full(task) | Self::Stopped(task) => task,
        }
    }

    /// Whether the rejection was due to a full slot
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }
}

impl<T> fmt::Debug for EnqueueRejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("EnqueueRejected::Full(..)"),
            Self::Stopped(_) => f.write_str("EnqueueRejected::Stopped(..)"),
        }
    }
}

/// Point-in-time state of one physical slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotStatus {
    /// 1-based slot index
    pub index: usize,
    /// Tasks routed to this slot so far
    pub processed: u64,
    /// Tasks currently waiting in the slot
    pub pending: usize,
    /// Configured slot capacity
    pub capacity: usize,
}

struct Slot<T> {
    tx: mpsc::Sender<T>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<T>>>,
    routed: AtomicU64,
}

/// One logical task stream over N bounded slots with a fixed worker pool
///
/// Slots and workers are fixed at start and never resized. Sequence-to-slot
/// mapping is a pure function of `|sequence| % worker_count`, stable for
/// the lifetime of the instance; FIFO order holds within a slot, never
/// across slots.
pub struct DispatchQueue<T> {
    name: String,
    worker_count: usize,
    capacity: usize,
    warning_threshold: f64,
    slots: Vec<Slot<T>>,
    affinity: Arc<dyn AffinityStrategy>,
    stats: Arc<StatsRecorder>,
    shutdown: watch::Sender<bool>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> DispatchQueue<T> {
    /// Start a queue with round-robin worker affinity
    ///
    /// See [`start_with_affinity`](Self::start_with_affinity).
    pub fn start(
        name: impl Into<String>,
        config: QueueConfig,
        registry: &QueueRegistry,
        worker: Arc<dyn Worker<T>>,
    ) -> Result<Arc<Self>> {
        Self::start_with_affinity(
            name,
            config,
            registry,
            worker,
            Arc::new(RoundRobinAffinity::new()),
        )
    }

    /// Start a queue, register it, and launch its worker pool
    ///
    /// Non-positive worker count or capacity fall back to the configured
    /// defaults. Registration fails with `DuplicateName` if the registry
    /// already holds a queue under this name, in which case nothing is
    /// spawned. Must be called within a tokio runtime.
    pub fn start_with_affinity(
        name: impl Into<String>,
        config: QueueConfig,
        registry: &QueueRegistry,
        worker: Arc<dyn Worker<T>>,
        affinity: Arc<dyn AffinityStrategy>,
    ) -> Result<Arc<Self>> {
        let name = name.into();
        let config = config.normalized();

        let slots = (0..config.worker_count)
            .map(|_| {
                let (tx, rx) = mpsc::channel(config.capacity);
                Slot {
                    tx,
                    rx: Arc::new(tokio::sync::Mutex::new(rx)),
                    routed: AtomicU64::new(0),
                }
            })
            .collect();

        let stats = Arc::new(StatsRecorder::with_history_depth(
            name.clone(),
            config.worker_count,
            config.capacity,
            config.history_depth,
        ));

        let (shutdown, _) = watch::channel(false);
        let queue = Arc::new(Self {
            name,
            worker_count: config.worker_count,
            capacity: config.capacity,
            warning_threshold: config.warning_threshold,
            slots,
            affinity,
            stats: Arc::clone(&stats),
            shutdown,
            workers: std::sync::Mutex::new(Vec::new()),
        });

        registry.register(Arc::clone(&queue) as Arc<dyn QueueHandle>, stats)?;

        let mut workers = Vec::with_capacity(config.worker_count);
        for identity in 0..config.worker_count {
            let handle = queue.bind_worker(identity as u64);
            let worker = Arc::clone(&worker);
            let shutdown = queue.shutdown.subscribe();
            workers.push(tokio::spawn(async move {
                while !*shutdown.borrow() {
                    worker.svc(&handle).await;
                }
            }));
        }
        *queue
            .workers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = workers;

        tracing::info!(
            queue = %queue.name,
            workers = queue.worker_count,
            capacity = queue.capacity,
            "queue started"
        );
        Ok(queue)
    }

    /// Bind a dequeue handle to one slot via the queue's affinity strategy
    ///
    /// With round-robin affinity the identity is ignored and one cursor
    /// increment is consumed per call; with identity affinity the result is
    /// `identity % worker_count` and repeat calls are idempotent.
    pub fn bind_worker(self: &Arc<Self>, identity: u64) -> WorkerHandle<T> {
        let slot = self.affinity.bind(identity, self.worker_count);
        WorkerHandle {
            queue: Arc::clone(self),
            slot,
        }
    }

    /// Route a task to the slot for `sequence` without blocking
    ///
    /// The sequence is normalized via absolute value; target slot is
    /// `|sequence| % worker_count`. A full slot or a stopped queue returns
    /// the task to the caller as [`EnqueueRejected`].
    pub fn enqueue(&self, sequence: i64, task: T) -> std::result::Result<(), EnqueueRejected<T>> {
        if *self.shutdown.borrow() {
            return Err(EnqueueRejected::Stopped(task));
        }
        let index = slot_for(sequence, self.worker_count);
        let slot = &self.slots[index];
        match slot.tx.try_send(task) {
            Ok(()) => {
                self.stats.record_received(1);
                slot.routed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(task)) => {
                tracing::error!(
                    queue = %self.name,
                    slot = index,
                    capacity = self.capacity,
                    "enqueue rejected: slot at capacity"
                );
                Err(EnqueueRejected::Full(task))
            }
            Err(TrySendError::Closed(task)) => Err(EnqueueRejected::Stopped(task)),
        }
    }

    fn slot_pending(&self, index: usize) -> usize {
        let tx = &self.slots[index].tx;
        tx.max_capacity() - tx.capacity()
    }

    /// Heuristic backpressure signal
    ///
    /// False once any slot's occupancy ratio strictly exceeds the warning
    /// threshold, or after shutdown. A true result is not a guarantee:
    /// callers must still handle enqueue rejection.
    pub fn is_admissible(&self) -> bool {
        if *self.shutdown.borrow() {
            return false;
        }
        for index in 0..self.slots.len() {
            let pending = self.slot_pending(index);
            if pending as f64 / self.capacity as f64 > self.warning_threshold {
                tracing::warn!(
                    queue = %self.name,
                    slot = index,
                    pending,
                    capacity = self.capacity,
                    "queue near capacity"
                );
                return false;
            }
        }
        true
    }

    /// Per-slot status, 1-based slot indices
    pub fn status(&self) -> Vec<SlotStatus> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| SlotStatus {
                index: i + 1,
                processed: slot.routed.load(Ordering::Relaxed),
                pending: self.slot_pending(i),
                capacity: self.capacity,
            })
            .collect()
    }

    /// Queue name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of physical slots / worker tasks
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Configured per-slot capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The queue's statistics recorder
    pub fn stats(&self) -> &Arc<StatsRecorder> {
        &self.stats
    }

    /// Whether shutdown has been initiated
    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Stop accepting work and release blocked dequeues
    ///
    /// In-flight blocking dequeues return `QueueStopped` promptly with
    /// their speculative processed count reconciled; workers exit after
    /// their current pass. Already-queued tasks stay in their slots.
    /// Registry removal is a separate, explicit step.
    pub fn shutdown(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        tracing::info!(queue = %self.name, "queue shutting down");
    }

    /// Wait for all worker tasks to exit
    pub async fn join(&self) {
        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        for handle in workers {
            let _ = handle.await;
        }
    }
}

impl<T: Send + 'static> QueueHandle for DispatchQueue<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> Vec<SlotStatus> {
        DispatchQueue::status(self)
    }

    fn is_admissible(&self) -> bool {
        DispatchQueue::is_admissible(self)
    }
}

/// Dequeue access bound to one physical slot for its lifetime
///
/// Handles are created by [`DispatchQueue::bind_worker`]; the queue binds
/// one per worker task at start. Both dequeue forms count the task as
/// processed before the wait and reconcile with a decrement if the wait is
/// cancelled, times out, or the queue stops, so a wait that produced
/// nothing nets to zero.
pub struct WorkerHandle<T> {
    queue: Arc<DispatchQueue<T>>,
    slot: usize,
}

impl<T: Send + 'static> WorkerHandle<T> {
    /// 0-based index of the bound slot
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Name of the owning queue
    pub fn queue_name(&self) -> &str {
        &self.queue.name
    }

    /// Wait until a task is available in the bound slot
    ///
    /// Returns `QueueStopped` promptly after shutdown. Cancel-safe: if the
    /// returned future is dropped mid-wait, no task is consumed and the
    /// processed counter is restored.
    pub async fn dequeue(&self) -> Result<T> {
        let guard = self.queue.stats.begin_processed();
        let mut shutdown = self.queue.shutdown.subscribe();
        let mut rx = self.queue.slots[self.slot].rx.lock().await;
        tokio::select! {
            item = rx.recv() => match item {
                Some(task) => {
                    guard.commit();
                    Ok(task)
                }
                None => Err(DispatchError::QueueStopped(self.queue.name.clone())),
            },
            _ = shutdown.wait_for(|stopped| *stopped) => {
                Err(DispatchError::QueueStopped(self.queue.name.clone()))
            }
        }
    }

    /// Wait up to `timeout` for a task in the bound slot
    ///
    /// Expiry returns `Ok(None)` with the processed counter reconciled;
    /// shutdown returns `QueueStopped`. The deadline covers acquiring slot
    /// access too, so a sibling handle parked in [`dequeue`](Self::dequeue)
    /// on the same slot cannot hold this call past its timeout.
    pub async fn dequeue_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        let guard = self.queue.stats.begin_processed();
        let mut shutdown = self.queue.shutdown.subscribe();
        let slot = &self.queue.slots[self.slot];
        tokio::select! {
            outcome = tokio::time::timeout(timeout, async {
                let mut rx = slot.rx.lock().await;
                rx.recv().await
            }) => match outcome {
                Ok(Some(task)) => {
                    guard.commit();
                    Ok(Some(task))
                }
                Ok(None) => Err(DispatchError::QueueStopped(self.queue.name.clone())),
                Err(_) => Ok(None),
            },
            _ = shutdown.wait_for(|stopped| *stopped) => {
                Err(DispatchError::QueueStopped(self.queue.name.clone()))
            }
        }
    }
}
