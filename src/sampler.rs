//! Shared scheduler and the periodic statistics sampler
//!
//! [`Scheduler`] runs repeating tasks on the tokio runtime, keyed by uuid
//! so they can be cancelled individually. [`PeriodicSampler`] is one such
//! task: on a fixed cadence it snapshots every statistics recorder in the
//! registry's live view, so queues registered or removed between ticks are
//! picked up without restarting anything. Both are explicitly constructed
//! services owned by the composition root.

use crate::config::SamplerConfig;
use crate::registry::QueueRegistry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Handle identifying one scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

/// Repeating-task scheduler on the tokio runtime
///
/// Tasks are aborted on cancel and when the scheduler drops, so the
/// scheduler's lifetime bounds every task it runs.
pub struct Scheduler {
    tasks: DashMap<TaskId, JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
        }
    }

    /// Run `task` every `period` after an initial `delay`
    ///
    /// Must be called within a tokio runtime; `period` must be non-zero.
    /// Returns the id to cancel the task with.
    pub fn register_repeating<F>(&self, delay: Duration, period: Duration, mut task: F) -> TaskId
    where
        F: FnMut() + Send + 'static,
    {
        let id = TaskId(Uuid::new_v4());
        let handle = tokio::spawn(async move {
            let first = tokio::time::Instant::now() + delay;
            let mut ticker = tokio::time::interval_at(first, period);
            loop {
                ticker.tick().await;
                task();
            }
        });
        self.tasks.insert(id, handle);
        tracing::info!(
            task = %id.0,
            delay_ms = delay.as_millis() as u64,
            period_ms = period.as_millis() as u64,
            "repeating task scheduled"
        );
        id
    }

    /// Cancel a scheduled task; returns whether it was known
    pub fn cancel(&self, id: TaskId) -> bool {
        match self.tasks.remove(&id) {
            Some((_, handle)) => {
                handle.abort();
                tracing::info!(task = %id.0, "scheduled task cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every scheduled task
    pub fn shutdown(&self) {
        let ids: Vec<TaskId> = self.tasks.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.cancel(id);
        }
    }

    /// Number of currently scheduled tasks
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
    }
}

/// Periodic snapshot driver for all registered queues
///
/// One repeating task on a shared [`Scheduler`]; each tick calls
/// [`StatsRecorder::snapshot`](crate::stats::StatsRecorder::snapshot) on
/// every recorder currently in the registry. Snapshot calls per recorder
/// are serialized by construction, since a single task walks them all.
pub struct PeriodicSampler {
    scheduler: Arc<Scheduler>,
    task: TaskId,
}

impl PeriodicSampler {
    /// Register the sampling task on a shared scheduler
    pub fn start(
        scheduler: Arc<Scheduler>,
        registry: Arc<QueueRegistry>,
        config: SamplerConfig,
    ) -> Self {
        let task = scheduler.register_repeating(config.initial_delay, config.period, move || {
            tracing::debug!(queues = registry.len(), "sampling queue statistics");
            registry.snapshot_all();
        });
        Self { scheduler, task }
    }

    /// Start a sampler with a scheduler of its own
    pub fn with_own_scheduler(registry: Arc<QueueRegistry>, config: SamplerConfig) -> Self {
        Self::start(Arc::new(Scheduler::new()), registry, config)
    }

    /// Id of the sampling task on the scheduler
    pub fn task_id(&self) -> TaskId {
        self.task
    }

    /// Cancel the sampling task; returns whether it was still scheduled
    pub fn stop(&self) -> bool {
        self.scheduler.cancel(self.task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::SlotStatus;
    use crate::registry::QueueHandle;
    use crate::stats::StatsRecorder;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubQueue;

    impl QueueHandle for StubQueue {
        fn name(&self) -> &str {
            "stub"
        }

        fn status(&self) -> Vec<SlotStatus> {
            Vec::new()
        }

        fn is_admissible(&self) -> bool {
            true
        }
    }

    fn register_stub(registry: &QueueRegistry, name: &str) -> Arc<StatsRecorder> {
        struct Named(String);
        impl QueueHandle for Named {
            fn name(&self) -> &str {
                &self.0
            }
            fn status(&self) -> Vec<SlotStatus> {
                Vec::new()
            }
            fn is_admissible(&self) -> bool {
                true
            }
        }
        let stats = Arc::new(StatsRecorder::new(name, 1, 4));
        registry
            .register(Arc::new(Named(name.to_string())), Arc::clone(&stats))
            .unwrap();
        stats
    }

    #[tokio::test]
    async fn test_register_repeating_ticks() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let id = scheduler.register_repeating(Duration::ZERO, Duration::from_millis(10), {
            let count = Arc::clone(&count);
            move || {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.cancel(id);
        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_initial_delay_defers_first_tick() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let _id = scheduler.register_repeating(
            Duration::from_millis(200),
            Duration::from_millis(10),
            {
                let count = Arc::clone(&count);
                move || {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_cancel_stops_ticks() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let id = scheduler.register_repeating(Duration::ZERO, Duration::from_millis(10), {
            let count = Arc::clone(&count);
            move || {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(scheduler.cancel(id));
        let after_cancel = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_cancel);
        // Cancelling again reports unknown
        assert!(!scheduler.cancel(id));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_all() {
        let scheduler = Scheduler::new();
        for _ in 0..3 {
            scheduler.register_repeating(Duration::ZERO, Duration::from_millis(10), || {});
        }
        assert_eq!(scheduler.task_count(), 3);
        scheduler.shutdown();
        assert_eq!(scheduler.task_count(), 0);
    }

    #[tokio::test]
    async fn test_sampler_snapshots_registered_recorders() {
        let registry = Arc::new(QueueRegistry::new());
        let stats = register_stub(&registry, "sampled");
        stats.record_received(5);

        let sampler = PeriodicSampler::with_own_scheduler(
            Arc::clone(&registry),
            SamplerConfig::new(Duration::from_millis(20), Duration::ZERO),
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        sampler.stop();

        let snaps = stats.drain_snapshots();
        assert!(!snaps.is_empty());
        assert_eq!(snaps[0].received, 5);
        // Later intervals saw no new traffic
        assert!(snaps.iter().skip(1).all(|s| s.received == 0));
    }

    #[tokio::test]
    async fn test_sampler_tracks_registry_growth() {
        let registry = Arc::new(QueueRegistry::new());
        let early = register_stub(&registry, "early");

        let sampler = PeriodicSampler::with_own_scheduler(
            Arc::clone(&registry),
            SamplerConfig::new(Duration::from_millis(20), Duration::ZERO),
        );

        tokio::time::sleep(Duration::from_millis(40)).await;
        // Registered between ticks; the live view must pick it up
        let late = register_stub(&registry, "late");
        late.record_received(2);
        tokio::time::sleep(Duration::from_millis(60)).await;
        sampler.stop();

        assert!(!early.drain_snapshots().is_empty());
        let late_snaps = late.drain_snapshots();
        assert!(!late_snaps.is_empty());
        assert_eq!(late_snaps.iter().map(|s| s.received).sum::<i64>(), 2);
    }

    #[tokio::test]
    async fn test_sampler_stop_is_idempotent() {
        let registry = Arc::new(QueueRegistry::new());
        registry
            .register(
                Arc::new(StubQueue),
                Arc::new(StatsRecorder::new("stub", 1, 4)),
            )
            .unwrap();
        let sampler = PeriodicSampler::with_own_scheduler(registry, SamplerConfig::default());
        assert!(sampler.stop());
        assert!(!sampler.stop());
    }
}
