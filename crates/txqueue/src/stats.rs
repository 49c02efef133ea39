//! Point-in-time view of a queue.

use serde::{Deserialize, Serialize};

/// Counts read together inside one critical section.
///
/// Two separate `count()` / `transaction_count()` calls may straddle another
/// thread's operation; a `QueueStats` never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Entries waiting in the backlog.
    pub backlog: usize,
    /// Entries currently checked out.
    pub reserved: usize,
    /// Keys issued since construction or the last clear.
    pub issued: u64,
}

impl QueueStats {
    /// Entries that are either waiting or checked out.
    pub fn live(&self) -> usize {
        self.backlog + self.reserved
    }

    /// Entries closed since construction or the last clear.
    pub fn closed(&self) -> u64 {
        self.issued.saturating_sub(self.live() as u64)
    }
}
