//! Entry identity.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Identity of one enqueued entry.
///
/// Keys are issued by a per-queue counter that starts at zero and is
/// pre-incremented on every enqueue, so the first key after construction or
/// `clear` is `EntryKey::FIRST`. A key is never reissued until `clear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryKey(u64);

impl EntryKey {
    pub const FIRST: EntryKey = EntryKey(1);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for EntryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<EntryKey> for u64 {
    fn from(key: EntryKey) -> Self {
        key.0
    }
}

/// Issues keys for one queue instance. Lives inside the queue lock.
#[derive(Debug, Default)]
pub(crate) struct KeyCounter {
    last: u64,
}

impl KeyCounter {
    /// Allocate the next key.
    ///
    /// Wraps to `#0` after `u64::MAX`; at one enqueue per nanosecond that is
    /// roughly 584 years of uptime. A wrap breaks key uniqueness: reissued
    /// keys can collide with entries still queued or reserved, and reserving
    /// a colliding key replaces the older reservation.
    pub(crate) fn next(&mut self) -> EntryKey {
        self.last = self.last.wrapping_add(1);
        EntryKey(self.last)
    }

    /// Number of keys issued since construction or the last reset.
    pub(crate) fn issued(&self) -> u64 {
        self.last
    }

    pub(crate) fn reset(&mut self) {
        self.last = 0;
    }

    #[cfg(test)]
    fn starting_after(last: u64) -> Self {
        Self { last }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_starts_at_first_and_resets() {
        let mut counter = KeyCounter::default();
        assert_eq!(counter.next(), EntryKey::FIRST);
        assert_eq!(counter.next(), EntryKey::new(2));
        assert_eq!(counter.issued(), 2);

        counter.reset();
        assert_eq!(counter.issued(), 0);
        assert_eq!(counter.next(), EntryKey::FIRST);
    }

    #[test]
    fn counter_wraps_to_zero_after_max() {
        let mut counter = KeyCounter::starting_after(u64::MAX - 1);
        assert_eq!(counter.next(), EntryKey::new(u64::MAX));
        assert_eq!(counter.next(), EntryKey::new(0));
        assert_eq!(counter.next(), EntryKey::FIRST);
    }

    #[test]
    fn key_serializes_as_bare_integer() {
        let json = serde_json::to_string(&EntryKey::new(42)).expect("key should serialize");
        assert_eq!(json, "42");
        let back: EntryKey = serde_json::from_str(&json).expect("key should deserialize");
        assert_eq!(back.get(), 42);
    }
}
