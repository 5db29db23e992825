//! # Pending-work containers.
//!
//! - [`PriorityQueue`] - items waiting for the dispatcher, ascending priority,
//!   FIFO among equals; retries are pushed to the front.
//! - [`RetryQueue`] - failed items waiting out their backoff, ordered by deadline.
//!
//! Both own their items; moving an item out is the only way to reach it.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use tokio::time::Instant;

use crate::core::item::Priority;

pub(crate) trait Prioritized {
    fn priority(&self) -> Priority;
}

pub(crate) struct PriorityQueue<I> {
    items: VecDeque<I>,
}

impl<I: Prioritized> PriorityQueue<I> {
    pub(crate) fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Inserts after the last item whose priority is `<=` the new one,
    /// scanning from the tail.
    pub(crate) fn push(&mut self, item: I) {
        let p = item.priority();
        let mut idx = self.items.len();
        while idx > 0 && self.items[idx - 1].priority() > p {
            idx -= 1;
        }
        self.items.insert(idx, item);
    }

    /// Inserts at the head regardless of priority.
    pub(crate) fn push_front(&mut self, item: I) {
        self.items.push_front(item);
    }

    pub(crate) fn pop(&mut self) -> Option<I> {
        self.items.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn drain_all(&mut self) -> Vec<I> {
        self.items.drain(..).collect()
    }
}

struct Scheduled<I> {
    due: Instant,
    seq: u64,
    item: I,
}

impl<I> PartialEq for Scheduled<I> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<I> Eq for Scheduled<I> {}

impl<I> PartialOrd for Scheduled<I> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed: BinaryHeap is a max-heap, the earliest deadline must surface first.
impl<I> Ord for Scheduled<I> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub(crate) struct RetryQueue<I> {
    heap: BinaryHeap<Scheduled<I>>,
    seq: u64,
}

impl<I> RetryQueue<I> {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    pub(crate) fn push(&mut self, due: Instant, item: I) {
        self.seq += 1;
        self.heap.push(Scheduled {
            due,
            seq: self.seq,
            item,
        });
    }

    pub(crate) fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|s| s.due)
    }

    /// Removes every item due at `now`, earliest deadline first.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Vec<I> {
        let mut due = Vec::new();
        while self.heap.peek().is_some_and(|s| s.due <= now) {
            if let Some(s) = self.heap.pop() {
                due.push(s.item);
            }
        }
        due
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn drain_all(&mut self) -> Vec<I> {
        self.heap.drain().map(|s| s.item).collect()
    }
}
