//! Process-wide directory of queues and their statistics recorders
//!
//! The registry is an explicitly constructed service the composition root
//! owns (typically in an `Arc`) and injects wherever queues start or status
//! is queried; there is no global instance. The backing map is safe for
//! unsynchronized concurrent reads and writes; `register` rejects name
//! collisions rather than overwriting.

use crate::error::{DispatchError, Result};
use crate::queue::SlotStatus;
use crate::stats::StatsRecorder;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Type-erased view of a queue, as the registry stores it
///
/// Implemented by [`DispatchQueue`](crate::queue::DispatchQueue) for any
/// task type; external monitoring code reads through this seam without
/// knowing the element type.
pub trait QueueHandle: Send + Sync {
    /// Unique queue name
    fn name(&self) -> &str;
    /// Per-slot status
    fn status(&self) -> Vec<SlotStatus>;
    /// Heuristic backpressure signal
    fn is_admissible(&self) -> bool;
}

struct RegistryEntry {
    queue: Arc<dyn QueueHandle>,
    stats: Arc<StatsRecorder>,
}

/// Name-keyed directory of running queues
pub struct QueueRegistry {
    entries: DashMap<String, RegistryEntry>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Add a queue and its recorder under the queue's name
    ///
    /// Fails with `DuplicateName` if the name is already taken; the
    /// existing entry is left untouched.
    pub fn register(&self, queue: Arc<dyn QueueHandle>, stats: Arc<StatsRecorder>) -> Result<()> {
        let name = queue.name().to_string();
        match self.entries.entry(name) {
            Entry::Occupied(occupied) => {
                Err(DispatchError::DuplicateName(occupied.key().clone()))
            }
            Entry::Vacant(vacant) => {
                tracing::info!(queue = %vacant.key(), "queue registered");
                vacant.insert(RegistryEntry { queue, stats });
                Ok(())
            }
        }
    }

    /// Remove a queue entry; returns whether it existed
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.entries.remove(name).is_some();
        if removed {
            tracing::info!(queue = %name, "queue removed from registry");
        }
        removed
    }

    /// Whether a queue is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Look up a queue handle by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn QueueHandle>> {
        self.entries.get(name).map(|e| Arc::clone(&e.queue))
    }

    /// Look up a queue's statistics recorder by name
    pub fn stats(&self, name: &str) -> Option<Arc<StatsRecorder>> {
        self.entries.get(name).map(|e| Arc::clone(&e.stats))
    }

    /// Names of all registered queues
    pub fn list(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of registered queues
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot every registered recorder
    ///
    /// Iterates the live map, so queues registered or removed between
    /// sampler ticks are picked up naturally.
    pub fn snapshot_all(&self) {
        for entry in self.entries.iter() {
            entry.stats.snapshot();
        }
    }
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::new()
    }
}
