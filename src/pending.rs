//! Queue of deferred colliding inserts.
//!
//! Entries are applied by their owner in FIFO order, either when their due
//! time has passed (`take_due`) or unconditionally (`drain`). Nothing runs on
//! its own; the map is single-threaded and the queue is only touched through
//! `&mut` access to it.

use std::collections::VecDeque;
use std::time::Instant;

/// Identifies one deferred insert so it can be cancelled.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug)]
pub(crate) struct PendingInsert<K, V> {
    pub(crate) ticket: Ticket,
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) due: Instant,
}

#[derive(Debug)]
pub(crate) struct PendingQueue<K, V> {
    queue: VecDeque<PendingInsert<K, V>>,
    next_ticket: u64,
}

impl<K, V> Default for PendingQueue<K, V> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            next_ticket: 0,
        }
    }
}

impl<K, V> PendingQueue<K, V> {
    pub(crate) fn push(&mut self, key: K, value: V, due: Instant) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        self.queue.push_back(PendingInsert {
            ticket,
            key,
            value,
            due,
        });
        ticket
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn cancel(&mut self, ticket: Ticket) -> Option<(K, V)> {
        let pos = self.queue.iter().position(|p| p.ticket == ticket)?;
        self.queue.remove(pos).map(|p| (p.key, p.value))
    }

    /// Removes every entry due at or before `now`, keeping queue order.
    ///
    /// Later entries with an earlier due time (a shorter delay configured
    /// after a longer one) are taken as well.
    pub(crate) fn take_due(&mut self, now: Instant) -> Vec<PendingInsert<K, V>> {
        let (due, waiting): (VecDeque<_>, VecDeque<_>) =
            self.queue.drain(..).partition(|p| p.due <= now);
        self.queue = waiting;
        due.into()
    }

    pub(crate) fn drain(&mut self) -> Vec<PendingInsert<K, V>> {
        self.queue.drain(..).collect()
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
    }
}
