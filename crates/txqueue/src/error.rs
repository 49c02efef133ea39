//! Error types for reservation queue operations.

use crate::key::EntryKey;

/// Errors raised by queue operations.
///
/// A failed operation never mutates the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The backlog had no entries when a reservation was requested.
    #[error("queue is empty: no entry available to reserve")]
    EmptyQueue,

    /// The key is not an active reservation (never issued, closed, or discarded).
    #[error("no active reservation for key {key}")]
    NoSuchReservation { key: EntryKey },
}

impl QueueError {
    pub fn is_empty_queue(&self) -> bool {
        matches!(self, Self::EmptyQueue)
    }

    /// The key the failed operation was called with, if any.
    pub fn key(&self) -> Option<EntryKey> {
        match self {
            Self::EmptyQueue => None,
            Self::NoSuchReservation { key } => Some(*key),
        }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
