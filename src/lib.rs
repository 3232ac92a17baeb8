//! # dispatchq
//!
//! An in-process task-distribution layer: sequence-routed bounded queues
//! with dedicated worker pools, per-queue throughput statistics, and a
//! periodic sampler.
//!
//! - Each [`DispatchQueue`] owns `worker_count` bounded slots; a task's
//!   sequence number picks its slot, so tasks sharing a sequence stream
//!   keep their relative order
//! - Workers are bound to one slot each through an [`AffinityStrategy`]
//!   and pull tasks through a [`WorkerHandle`]
//! - A [`StatsRecorder`] per queue tracks received/processed totals and a
//!   ring-buffered history of interval [`Snapshot`]s, driven by a
//!   [`PeriodicSampler`] over the shared [`QueueRegistry`]
//! - A [`SequenceAllocator`] hands out per-service sequence numbers so
//!   producers don't invent their own
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dispatchq::{
//!     DispatchQueue, PeriodicSampler, QueueConfig, QueueRegistry, SamplerConfig,
//!     Scheduler, SequenceAllocator, Worker, WorkerHandle,
//! };
//! use async_trait::async_trait;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl Worker<String> for Printer {
//!     async fn svc(&self, queue: &WorkerHandle<String>) {
//!         if let Ok(Some(task)) = queue.dequeue_timeout(Duration::from_millis(100)).await {
//!             println!("slot {}: {task}", queue.slot());
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> dispatchq::Result<()> {
//!     let registry = Arc::new(QueueRegistry::new());
//!     let scheduler = Arc::new(Scheduler::new());
//!     let sampler = PeriodicSampler::start(
//!         Arc::clone(&scheduler),
//!         Arc::clone(&registry),
//!         SamplerConfig::default(),
//!     );
//!
//!     let queue = DispatchQueue::start(
//!         "printer",
//!         QueueConfig::new(4, 1000),
//!         &registry,
//!         Arc::new(Printer),
//!     )?;
//!
//!     let sequences = SequenceAllocator::new();
//!     let seq = sequences.next_sequence("svcA")?;
//!     if let Err(rejected) = queue.enqueue(seq, "hello".to_string()) {
//!         eprintln!("rejected: {rejected:?}");
//!     }
//!
//!     queue.shutdown();
//!     queue.join().await;
//!     sampler.stop();
//!     Ok(())
//! }
//! ```

pub mod affinity;
pub mod config;
pub mod error;
pub mod queue;
pub mod registry;
pub mod ring;
pub mod sampler;
pub mod seq;
pub mod stats;

pub use affinity::{slot_for, AffinityStrategy, IdentityAffinity, RoundRobinAffinity};
pub use config::{
    QueueConfig, SamplerConfig, DEFAULT_CAPACITY, DEFAULT_HISTORY_DEPTH,
    DEFAULT_WARNING_THRESHOLD, DEFAULT_WORKER_COUNT,
};
pub use error::{DispatchError, Result};
pub use queue::{DispatchQueue, EnqueueRejected, SlotStatus, Worker, WorkerHandle};
pub use registry::{QueueHandle, QueueRegistry};
pub use ring::RingBuffer;
pub use sampler::{PeriodicSampler, Scheduler, TaskId};
pub use seq::{SequenceAllocator, RESET_MARGIN};
pub use stats::{Snapshot, StatsRecorder};
