//! Per-service task sequence allocation
//!
//! Producers obtain a sequence number per service before enqueuing, so all
//! tasks of one service route to the same slot and keep their relative
//! order. Counters are per-service, start at 1, and are reset to zero once
//! they come within [`RESET_MARGIN`] of the representable maximum.

use crate::error::{DispatchError, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// How close to `i64::MAX` a sequence may get before a reset applies
pub const RESET_MARGIN: i64 = 10_000;

/// Monotonic per-service sequence counters
///
/// An explicitly constructed service, shared by reference or `Arc` from
/// the composition root; no global instance. Concurrent callers for the
/// same service receive distinct, totally ordered values.
pub struct SequenceAllocator {
    counters: DashMap<String, AtomicI64>,
}

impl SequenceAllocator {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }

    /// Next sequence for `service_id`, starting at 1 on first call
    pub fn next_sequence(&self, service_id: &str) -> Result<i64> {
        if service_id.is_empty() {
            return Err(DispatchError::InvalidArgument(
                "service id must not be empty".to_string(),
            ));
        }
        let counter = self
            .counters
            .entry(service_id.to_string())
            .or_insert_with(|| AtomicI64::new(0));
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Reset the counter to zero when `current_sequence` nears the maximum
    ///
    /// No-op below the margin and for services never allocated. Fails with
    /// `InvalidArgument` on an empty service id or a negative sequence.
    pub fn maybe_reset(&self, service_id: &str, current_sequence: i64) -> Result<()> {
        if service_id.is_empty() {
            return Err(DispatchError::InvalidArgument(
                "service id must not be empty".to_string(),
            ));
        }
        if current_sequence < 0 {
            return Err(DispatchError::InvalidArgument(
                "sequence must not be negative".to_string(),
            ));
        }
        if current_sequence > i64::MAX - RESET_MARGIN {
            if let Some(counter) = self.counters.get(service_id) {
                counter.store(0, Ordering::SeqCst);
                tracing::info!(service = %service_id, "sequence counter reset");
            }
        }
        Ok(())
    }

    /// Number of services with an allocated counter
    pub fn service_count(&self) -> usize {
        self.counters.len()
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_first_sequence_is_one() {
        let allocator = SequenceAllocator::new();
        assert_eq!(allocator.next_sequence("svc").unwrap(), 1);
        assert_eq!(allocator.next_sequence("svc").unwrap(), 2);
    }

    #[test]
    fn test_services_are_independent() {
        let allocator = SequenceAllocator::new();
        allocator.next_sequence("a").unwrap();
        allocator.next_sequence("a").unwrap();
        assert_eq!(allocator.next_sequence("b").unwrap(), 1);
        assert_eq!(allocator.service_count(), 2);
    }

    #[test]
    fn test_empty_service_id_rejected() {
        let allocator = SequenceAllocator::new();
        assert!(matches!(
            allocator.next_sequence(""),
            Err(DispatchError::InvalidArgument(_))
        ));
        assert!(matches!(
            allocator.maybe_reset("", 1),
            Err(DispatchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_negative_sequence_rejected() {
        let allocator = SequenceAllocator::new();
        assert!(matches!(
            allocator.maybe_reset("svc", -1),
            Err(DispatchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_reset_near_max() {
        let allocator = SequenceAllocator::new();
        allocator.next_sequence("svc").unwrap();
        allocator
            .maybe_reset("svc", i64::MAX - RESET_MARGIN + 1)
            .unwrap();
        // Counter went back to zero, so the next sequence is 1 again
        assert_eq!(allocator.next_sequence("svc").unwrap(), 1);
    }

    #[test]
    fn test_no_reset_below_margin() {
        let allocator = SequenceAllocator::new();
        allocator.next_sequence("svc").unwrap();
        allocator.maybe_reset("svc", i64::MAX - RESET_MARGIN).unwrap();
        assert_eq!(allocator.next_sequence("svc").unwrap(), 2);
    }

    #[test]
    fn test_reset_unknown_service_is_noop() {
        let allocator = SequenceAllocator::new();
        allocator.maybe_reset("never-seen", i64::MAX - 1).unwrap();
        assert_eq!(allocator.service_count(), 0);
    }

    #[test]
    fn test_concurrent_allocation_distinct_and_complete() {
        let allocator = Arc::new(SequenceAllocator::new());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                std::thread::spawn(move || {
                    (0..10)
                        .map(|_| allocator.next_sequence("svcA").unwrap())
                        .collect::<Vec<i64>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for seq in handle.join().unwrap() {
                assert!(seen.insert(seq), "duplicate sequence {seq}");
            }
        }
        assert_eq!(seen.len(), 100);
        let expected: HashSet<i64> = (1..=100).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_per_thread_values_strictly_increase() {
        let allocator = Arc::new(SequenceAllocator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                std::thread::spawn(move || {
                    let values: Vec<i64> = (0..50)
                        .map(|_| allocator.next_sequence("svc").unwrap())
                        .collect();
                    assert!(values.windows(2).all(|w| w[0] < w[1]));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
