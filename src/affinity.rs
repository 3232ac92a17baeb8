//! Sequence-to-slot routing and worker affinity strategies
//!
//! Enqueue routing is a pure function of the sequence number. Dequeue
//! affinity is pluggable: a strategy binds each worker context to one
//! physical slot, either by first-come round-robin assignment or by a
//! stable identity supplied by the caller.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Map a sequence number to a physical slot in `[0, slots)`
///
/// The sequence is normalized via its absolute value, so `-7` and `7` land
/// in the same slot. `slots` must be non-zero; the queue guarantees that.
pub fn slot_for(sequence: i64, slots: usize) -> usize {
    (sequence.unsigned_abs() % slots as u64) as usize
}

/// Rule binding a worker context to a physical slot for its lifetime
///
/// `bind` is called once per context, at handle creation. Implementations
/// differ in whether the result depends on call order.
pub trait AffinityStrategy: Send + Sync {
    /// Choose a slot in `[0, slots)` for the context with the given identity
    fn bind(&self, identity: u64, slots: usize) -> usize;
}

/// First-come round-robin assignment
///
/// Stateful and order-dependent: the first context to bind gets slot 0,
/// the second slot 1, and so on, wrapping with no reuse protection when
/// contexts outnumber slots. The identity argument is ignored.
pub struct RoundRobinAffinity {
    cursor: AtomicUsize,
}

impl RoundRobinAffinity {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinAffinity {
    fn default() -> Self {
        Self::new()
    }
}

impl AffinityStrategy for RoundRobinAffinity {
    fn bind(&self, _identity: u64, slots: usize) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed) % slots
    }
}

/// Stable-identity assignment: `identity % slots`
///
/// Idempotent per identity, independent of binding order. Used when worker
/// identities are stable and known in advance.
pub struct IdentityAffinity;

impl IdentityAffinity {
    pub fn new() -> Self {
        Self
    }
}

impl Default for IdentityAffinity {
    fn default() -> Self {
        Self::new()
    }
}

impl AffinityStrategy for IdentityAffinity {
    fn bind(&self, identity: u64, slots: usize) -> usize {
        (identity % slots as u64) as usize
    }
}
