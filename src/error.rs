//! Error types for the dispatch queue system
//!
//! All errors implement the `std::error::Error` trait via `thiserror::Error`.
//!
//! Expected backpressure conditions are deliberately *not* part of this
//! enum: a full slot surfaces as [`EnqueueRejected`](crate::queue::EnqueueRejected),
//! a value-carrying return signal, and a timed-out dequeue surfaces as
//! `Ok(None)`. The variants here cover programmer errors and lifecycle
//! violations that should fail fast.

use thiserror::Error;

/// Dispatch queue error type
///
/// # Variants
///
/// * `Empty` - Ring buffer dequeue/peek on an empty buffer
/// * `DuplicateName` - A queue with this name is already registered
/// * `InvalidArgument` - Empty service id, negative sequence, or similar misuse
/// * `QueueStopped` - A dequeue observed the queue after shutdown
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Ring buffer has no element to return
    #[error("buffer is empty")]
    Empty,

    /// Registry name collision at start
    #[error("queue name already registered: {0}")]
    DuplicateName(String),

    /// Caller passed an argument the operation cannot accept
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The queue has been shut down
    #[error("queue is stopped: {0}")]
    QueueStopped(String),
}

/// Result type alias using DispatchError
pub type Result<T> = std::result::Result<T, DispatchError>;
