//! The reservation queue.
//!
//! One lock guards the backlog, the reservation table and the key counter
//! together. Every public method is exactly one critical section, so callers
//! never observe an entry that is in both structures or in neither while
//! still live.
//!
//! - `enqueue` appends to the backlog tail
//! - `create_transaction` moves the backlog head into the reservation table
//! - `discard_transaction` moves a reservation back to the backlog *tail*
//! - `close_transaction` drops a reservation for good
//!
//! Nothing here blocks waiting for work: an empty backlog is reported as
//! `QueueError::EmptyQueue` straight away.

use crate::error::{QueueError, Result};
use crate::key::{EntryKey, KeyCounter};
use crate::stats::QueueStats;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Debug, Formatter};

/// A checked-out entry: the payload as it was when reserved, and the key used
/// to update, discard or close it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation<T> {
    pub key: EntryKey,
    pub value: T,
}

impl<T> Reservation<T> {
    pub fn into_parts(self) -> (T, EntryKey) {
        (self.value, self.key)
    }
}

#[derive(Debug)]
struct Entry<T> {
    key: EntryKey,
    value: T,
}

struct QueueState<T> {
    keys: KeyCounter,
    backlog: VecDeque<Entry<T>>,
    reservations: BTreeMap<EntryKey, Entry<T>>,
}

impl<T> QueueState<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: KeyCounter::default(),
            backlog: VecDeque::with_capacity(capacity),
            reservations: BTreeMap::new(),
        }
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            backlog: self.backlog.len(),
            reserved: self.reservations.len(),
            issued: self.keys.issued(),
        }
    }

    fn reservation_mut(&mut self, key: EntryKey) -> Result<&mut Entry<T>> {
        self.reservations
            .get_mut(&key)
            .ok_or(QueueError::NoSuchReservation { key })
    }

    fn take_reservation(&mut self, key: EntryKey) -> Result<Entry<T>> {
        self.reservations
            .remove(&key)
            .ok_or(QueueError::NoSuchReservation { key })
    }
}

/// FIFO queue with revocable checkouts.
///
/// Share it between threads with `Arc<ReservationQueue<T>>`; all methods
/// take `&self`.
pub struct ReservationQueue<T> {
    state: Mutex<QueueState<T>>,
}

impl<T> Default for ReservationQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for ReservationQueue<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ReservationQueue")
            .field("backlog", &stats.backlog)
            .field("reserved", &stats.reserved)
            .field("issued", &stats.issued)
            .finish()
    }
}

impl<T> ReservationQueue<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Build a queue whose backlog can hold `capacity` entries before
    /// reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::with_capacity(capacity)),
        }
    }

    /// Append `value` to the backlog tail and return its freshly issued key.
    ///
    /// Keys strictly increase; the returned key equals the number of entries
    /// enqueued since construction or the last `clear`.
    pub fn enqueue(&self, value: T) -> EntryKey {
        let mut state = self.state.lock();
        let key = state.keys.next();
        state.backlog.push_back(Entry { key, value });
        tracing::debug!(%key, backlog = state.backlog.len(), "entry enqueued");
        key
    }

    /// Overwrite the payload of an active reservation in place.
    ///
    /// The entry stays reserved under the same key.
    pub fn update_transaction(&self, key: EntryKey, value: T) -> Result<()> {
        let mut state = self.state.lock();
        match state.reservation_mut(key) {
            Ok(entry) => {
                entry.value = value;
                tracing::debug!(%key, "reservation updated");
                Ok(())
            }
            Err(err) => {
                tracing::debug!(%key, "update rejected: no active reservation");
                Err(err)
            }
        }
    }

    /// Revoke a reservation and put its entry at the backlog *tail*.
    ///
    /// The entry keeps its key but loses its original place in line; any
    /// caller may reserve it again later.
    pub fn discard_transaction(&self, key: EntryKey) -> Result<()> {
        let mut state = self.state.lock();
        let entry = state.take_reservation(key).inspect_err(|_| {
            tracing::debug!(%key, "discard rejected: no active reservation");
        })?;
        state.backlog.push_back(entry);
        tracing::debug!(
            %key,
            backlog = state.backlog.len(),
            reserved = state.reservations.len(),
            "reservation discarded"
        );
        Ok(())
    }

    /// Finalize a reservation, removing its entry permanently.
    ///
    /// Returns the payload as last updated. The key is not reused.
    pub fn close_transaction(&self, key: EntryKey) -> Result<T> {
        let mut state = self.state.lock();
        let entry = state.take_reservation(key).inspect_err(|_| {
            tracing::debug!(%key, "close rejected: no active reservation");
        })?;
        tracing::debug!(
            %key,
            reserved = state.reservations.len(),
            "reservation closed"
        );
        Ok(entry.value)
    }

    /// Number of entries waiting in the backlog.
    pub fn count(&self) -> usize {
        self.state.lock().backlog.len()
    }

    /// Number of entries currently checked out.
    pub fn transaction_count(&self) -> usize {
        self.state.lock().reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().backlog.is_empty()
    }

    pub fn is_reserved(&self, key: EntryKey) -> bool {
        self.state.lock().reservations.contains_key(&key)
    }

    /// Backlog length, reservation count and issued keys, read atomically.
    pub fn stats(&self) -> QueueStats {
        self.state.lock().stats()
    }

    /// Drop every entry, reserved or not, and reset the key counter.
    ///
    /// Reservations held by other callers are invalidated silently; their
    /// keys will later fail with `NoSuchReservation` (or, once reissued,
    /// refer to a new entry). Meant for full resets, not steady state.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let dropped = state.stats();
        state.backlog.clear();
        state.reservations.clear();
        state.keys.reset();

        if dropped.reserved > 0 {
            tracing::warn!(
                reserved = dropped.reserved,
                backlog = dropped.backlog,
                "queue cleared with reservations still checked out"
            );
        } else {
            tracing::debug!(backlog = dropped.backlog, "queue cleared");
        }
    }
}

impl<T: Clone> ReservationQueue<T> {
    /// Check out the longest-waiting backlog entry.
    ///
    /// The entry moves into the reservation table; the caller gets a copy of
    /// its payload and the key to finish the reservation with. Fails with
    /// `EmptyQueue` immediately when nothing is waiting.
    pub fn create_transaction(&self) -> Result<Reservation<T>> {
        let mut state = self.state.lock();
        let Some(entry) = state.backlog.pop_front() else {
            tracing::debug!("reservation rejected: backlog empty");
            return Err(QueueError::EmptyQueue);
        };

        let reservation = Reservation {
            key: entry.key,
            value: entry.value.clone(),
        };
        state.reservations.insert(entry.key, entry);
        tracing::debug!(
            key = %reservation.key,
            backlog = state.backlog.len(),
            reserved = state.reservations.len(),
            "reservation created"
        );
        Ok(reservation)
    }

    /// Current payload of an active reservation, without changing its state.
    pub fn reserved_value(&self, key: EntryKey) -> Result<T> {
        let state = self.state.lock();
        state
            .reservations
            .get(&key)
            .map(|entry| entry.value.clone())
            .ok_or(QueueError::NoSuchReservation { key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> ReservationQueue<i32> {
        ReservationQueue::new()
    }

    #[test]
    fn new_queue_is_empty() {
        let q = queue();
        assert_eq!(q.count(), 0);
        assert_eq!(q.transaction_count(), 0);
        assert!(q.is_empty());
        assert_eq!(q.stats(), QueueStats::default());
    }

    #[test]
    fn enqueue_grows_backlog_and_issues_increasing_keys() {
        let q = queue();
        let keys: Vec<EntryKey> = (1..=4).map(|v| q.enqueue(v)).collect();

        assert_eq!(
            keys,
            vec![
                EntryKey::new(1),
                EntryKey::new(2),
                EntryKey::new(3),
                EntryKey::new(4)
            ]
        );
        assert_eq!(q.count(), 4);
    }

    #[test]
    fn enqueue_key_equals_running_total() {
        let q = queue();
        q.enqueue(10);
        q.enqueue(11);
        let key = q.enqueue(12);
        assert_eq!(key.get(), q.count() as u64);
    }

    #[test]
    fn create_transaction_returns_enqueued_value_and_key() {
        let q = queue();
        let key = q.enqueue(1);

        let reservation = q.create_transaction().expect("entry should be reservable");
        assert_eq!(reservation.key, key);
        assert_eq!(reservation.value, 1);
        assert_eq!(q.count(), 0);
        assert_eq!(q.transaction_count(), 1);
        assert!(q.is_reserved(key));
    }

    #[test]
    fn create_transaction_is_fifo_without_discards() {
        let q = queue();
        for v in 1..=4 {
            q.enqueue(v);
        }

        for expected in 1..=3 {
            let reservation = q.create_transaction().expect("entry should be reservable");
            assert_eq!(reservation.value, expected);
        }
        assert_eq!(q.count(), 1);
        assert_eq!(q.transaction_count(), 3);
    }

    #[test]
    fn create_transaction_on_empty_backlog_fails_without_side_effects() {
        let q = queue();
        let err = q
            .create_transaction()
            .expect_err("empty backlog must not yield a reservation");
        assert_eq!(err, QueueError::EmptyQueue);
        assert_eq!(q.stats(), QueueStats::default());
    }

    #[test]
    fn create_transaction_fails_when_everything_is_reserved() {
        let q = queue();
        q.enqueue(1);
        q.create_transaction().expect("first reservation");

        let err = q.create_transaction().expect_err("backlog is drained");
        assert!(err.is_empty_queue());
        assert_eq!(q.transaction_count(), 1);
    }

    #[test]
    fn discard_moves_entry_to_backlog_tail() {
        let q = queue();
        q.enqueue(1);
        q.enqueue(2);

        let first = q.create_transaction().expect("reserve 1");
        assert_eq!(first.value, 1);
        q.discard_transaction(first.key).expect("discard 1");

        let second = q.create_transaction().expect("reserve 2");
        assert_eq!(second.value, 2);

        let again = q.create_transaction().expect("reserve 1 again");
        assert_eq!(again.value, 1);
        assert_eq!(again.key, first.key);
        assert_eq!(q.count(), 0);
        assert_eq!(q.transaction_count(), 2);
    }

    #[test]
    fn discard_restores_counts() {
        let q = queue();
        q.enqueue(1);
        let reservation = q.create_transaction().expect("reserve");

        q.discard_transaction(reservation.key).expect("discard");
        assert_eq!(q.count(), 1);
        assert_eq!(q.transaction_count(), 0);
        assert!(!q.is_reserved(reservation.key));
    }

    #[test]
    fn update_then_discard_carries_new_value() {
        let q = queue();
        q.enqueue(1);
        let reservation = q.create_transaction().expect("reserve");

        q.update_transaction(reservation.key, 2).expect("update");
        assert_eq!(q.reserved_value(reservation.key).expect("still reserved"), 2);
        q.discard_transaction(reservation.key).expect("discard");

        let again = q.create_transaction().expect("reserve again");
        assert_eq!(again.value, 2);
    }

    #[test]
    fn close_removes_entry_and_returns_final_value() {
        let q = queue();
        q.enqueue(1);
        let reservation = q.create_transaction().expect("reserve");
        q.update_transaction(reservation.key, 5).expect("update");

        let closed = q.close_transaction(reservation.key).expect("close");
        assert_eq!(closed, 5);
        assert_eq!(q.count(), 0);
        assert_eq!(q.transaction_count(), 0);
        assert_eq!(q.stats().closed(), 1);
    }

    #[test]
    fn close_twice_fails_second_time_and_leaves_state_alone() {
        let q = queue();
        q.enqueue(1);
        q.enqueue(2);
        let reservation = q.create_transaction().expect("reserve");

        q.close_transaction(reservation.key).expect("first close");
        let after_first = q.stats();

        let err = q
            .close_transaction(reservation.key)
            .expect_err("second close must fail");
        assert!(matches!(
            err,
            QueueError::NoSuchReservation { key } if key == reservation.key
        ));
        assert_eq!(q.stats(), after_first);
    }

    #[test]
    fn unknown_keys_are_rejected_by_update_discard_and_close() {
        let q = queue();
        let waiting = q.enqueue(1);
        let never_issued = EntryKey::new(99);

        for key in [waiting, never_issued] {
            let expected = QueueError::NoSuchReservation { key };
            assert_eq!(q.update_transaction(key, 3), Err(expected));
            assert_eq!(q.discard_transaction(key), Err(expected));
            assert_eq!(q.close_transaction(key), Err(expected));
            assert_eq!(q.reserved_value(key), Err(expected));
        }

        // The waiting entry was neither touched nor duplicated.
        assert_eq!(q.count(), 1);
        assert_eq!(q.create_transaction().expect("reserve").value, 1);
    }

    #[test]
    fn discarded_key_cannot_be_closed() {
        let q = queue();
        q.enqueue(1);
        let reservation = q.create_transaction().expect("reserve");
        q.discard_transaction(reservation.key).expect("discard");

        let err = q
            .close_transaction(reservation.key)
            .expect_err("discarded key is back in the backlog");
        assert_eq!(err.key(), Some(reservation.key));
        assert_eq!(q.count(), 1);
    }

    #[test]
    fn clear_resets_counts_and_key_counter() {
        let q = queue();
        for v in 1..=4 {
            q.enqueue(v);
        }
        q.create_transaction().expect("reserve 1");
        q.create_transaction().expect("reserve 2");

        q.clear();
        assert_eq!(q.count(), 0);
        assert_eq!(q.transaction_count(), 0);
        assert_eq!(q.stats().issued, 0);
        assert_eq!(q.enqueue(9), EntryKey::FIRST);
    }

    #[test]
    fn clear_invalidates_outstanding_reservations() {
        let q = queue();
        q.enqueue(1);
        let reservation = q.create_transaction().expect("reserve");

        q.clear();
        assert_eq!(
            q.close_transaction(reservation.key),
            Err(QueueError::NoSuchReservation {
                key: reservation.key
            })
        );
    }

    #[test]
    fn stats_account_for_every_issued_key() {
        let q = queue();
        for v in 0..5 {
            q.enqueue(v);
        }
        let a = q.create_transaction().expect("reserve a");
        let b = q.create_transaction().expect("reserve b");
        q.create_transaction().expect("reserve c");
        q.close_transaction(a.key).expect("close a");
        q.discard_transaction(b.key).expect("discard b");

        let stats = q.stats();
        assert_eq!(stats.backlog, 3);
        assert_eq!(stats.reserved, 1);
        assert_eq!(stats.issued, 5);
        assert_eq!(stats.closed(), 1);
    }

    #[test]
    fn reservation_into_parts_matches_fields() {
        let q: ReservationQueue<String> = ReservationQueue::with_capacity(4);
        let key = q.enqueue("job".to_string());
        let (value, reserved_key) = q
            .create_transaction()
            .expect("reserve")
            .into_parts();
        assert_eq!(value, "job");
        assert_eq!(reserved_key, key);
    }

    #[test]
    fn debug_shows_counts() {
        let q = queue();
        q.enqueue(1);
        assert_eq!(
            format!("{q:?}"),
            "ReservationQueue { backlog: 1, reserved: 0, issued: 1 }"
        );
    }
}
