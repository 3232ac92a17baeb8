//! Fixed-capacity ring buffer with overwrite-on-full and reversible dequeue
//!
//! Used internally to hold recent throughput snapshots, but generic over any
//! cloneable element. When full, a new element silently evicts the oldest.
//! The most recent dequeue can be undone once, which is enough to hand an
//! element back after a consumer decides not to use it.

use crate::error::{DispatchError, Result};
use std::sync::{Mutex, MutexGuard, PoisonError};

struct RingInner<T> {
    data: Vec<Option<T>>,
    head: usize,
    size: usize,
    /// Bumped on every enqueue/dequeue; visible for diagnostics
    modified: u64,
    /// Physical index of the most recent dequeue, until invalidated
    last_dequeue: Option<usize>,
}

impl<T> RingInner<T> {
    /// Physical index of the slot `offset` positions past head
    fn index(&self, offset: usize) -> usize {
        (self.head + offset) % self.data.len()
    }
}

/// Fixed-capacity circular buffer
///
/// All mutating operations run under a single per-instance lock, held for
/// the whole operation. The buffer is never resized after construction.
pub struct RingBuffer<T> {
    inner: Mutex<RingInner<T>>,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding up to `capacity` elements (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut data = Vec::with_capacity(capacity);
        data.resize_with(capacity, || None);
        Self {
            inner: Mutex::new(RingInner {
                data,
                head: 0,
                size: 0,
                modified: 0,
                last_dequeue: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an element at the tail
    ///
    /// When the buffer is full the oldest element is overwritten and head
    /// advances by one; any pending undo is invalidated by that overwrite.
    pub fn enqueue(&self, item: T) {
        let mut inner = self.lock();
        let tail = inner.index(inner.size);
        inner.data[tail] = Some(item);
        if inner.size == inner.data.len() {
            inner.head = inner.index(1);
            inner.last_dequeue = None;
        } else {
            inner.size += 1;
        }
        inner.modified += 1;
    }

    /// Number of elements currently held
    pub fn len(&self) -> usize {
        self.lock().size
    }

    /// Whether the buffer holds no elements
    pub fn is_empty(&self) -> bool {
        self.lock().size == 0
    }

    /// Maximum number of elements the buffer can hold
    pub fn capacity(&self) -> usize {
        self.lock().data.len()
    }

    /// Total enqueue/dequeue mutations since construction
    pub fn modification_count(&self) -> u64 {
        self.lock().modified
    }

    /// Move head back over the most recent dequeue, restoring that element
    ///
    /// No-op when nothing has been dequeued since the last undo, and when
    /// the buffer is already full. Single level only: the mark is cleared
    /// after a successful undo.
    pub fn undo_last_dequeue(&self) {
        let mut inner = self.lock();
        if inner.last_dequeue.is_none() || inner.size == inner.data.len() {
            return;
        }
        let capacity = inner.data.len();
        inner.head = (inner.head + capacity - 1) % capacity;
        inner.size += 1;
        inner.last_dequeue = None;
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Remove and return the head element
    ///
    /// The slot keeps its value until overwritten, so the removal can be
    /// reversed by [`undo_last_dequeue`](Self::undo_last_dequeue).
    pub fn dequeue(&self) -> Result<T> {
        let mut inner = self.lock();
        if inner.size == 0 {
            return Err(DispatchError::Empty);
        }
        let head = inner.head;
        let Some(item) = inner.data[head].clone() else {
            return Err(DispatchError::Empty);
        };
        inner.last_dequeue = Some(head);
        inner.head = inner.index(1);
        inner.size -= 1;
        inner.modified += 1;
        Ok(item)
    }

    /// Return the head element without removing it
    pub fn peek(&self) -> Result<T> {
        let inner = self.lock();
        if inner.size == 0 {
            return Err(DispatchError::Empty);
        }
        inner.data[inner.head].clone().ok_or(DispatchError::Empty)
    }

    /// Lazy traversal from the oldest element to the newest
    ///
    /// Each step reads under the lock, so the view is last-writer-wins: it
    /// is restartable and never blocks writers, but offers no snapshot
    /// isolation against concurrent mutation.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            ring: self,
            offset: 0,
        }
    }
}

/// Sequential view over a [`RingBuffer`], oldest first
pub struct Iter<'a, T> {
    ring: &'a RingBuffer<T>,
    offset: usize,
}

impl<T: Clone> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let inner = self.ring.lock();
        if self.offset >= inner.size {
            return None;
        }
        let item = inner.data[inner.index(self.offset)].clone();
        self.offset += 1;
        item
    }
}
