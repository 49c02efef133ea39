//! # txqueue
//!
//! A FIFO queue whose items can be checked out under a revocable reservation.
//!
//! This crate provides:
//! - `ReservationQueue<T>` (backlog + reservation table behind one lock)
//! - `EntryKey` (the monotonically increasing identity of an entry)
//! - `Reservation<T>` (what a caller holds while processing an entry)
//! - `QueueStats` (a consistent snapshot of both structures)
//!
//! It intentionally does not persist, expire or route entries. A caller that
//! never closes or discards a reservation keeps that entry checked out.
//!
//! ## Entry lifecycle
//!
//! ```text
//! enqueue ──▶ backlog ──create_transaction──▶ reserved ──close──▶ (gone)
//!                ▲                                │
//!                └──────── discard (tail) ────────┘
//! ```

pub mod error;
pub mod key;
pub mod queue;
pub mod stats;

pub use error::{QueueError, Result};
pub use key::EntryKey;
pub use queue::{Reservation, ReservationQueue};
pub use stats::QueueStats;
