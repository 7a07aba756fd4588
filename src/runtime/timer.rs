//! Timer heap for deadline management.
//!
//! This module provides a min-heap of cancelable `(deadline, callback)`
//! entries. Entries fire at most once; a canceled entry is skipped on pop and
//! never resurrected. Equal deadlines fire in insertion order.

use crate::types::Time;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Callback fired on the scheduler thread when a deadline expires.
pub(crate) type TimerCallback = Box<dyn FnOnce() + Send>;

pub(crate) struct TimerShared {
    canceled: AtomicBool,
    callback: Mutex<Option<TimerCallback>>,
}

impl std::fmt::Debug for TimerShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerShared")
            .field("canceled", &self.is_canceled())
            .finish_non_exhaustive()
    }
}

impl TimerShared {
    fn new(callback: TimerCallback) -> Self {
        Self {
            canceled: AtomicBool::new(false),
            callback: Mutex::new(Some(callback)),
        }
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.canceled.load(AtomicOrdering::Acquire)
    }

    /// Takes and runs the callback unless the entry was canceled.
    pub(crate) fn fire(&self) {
        if self.is_canceled() {
            return;
        }
        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// Handle to a scheduled timer entry; cancel is race-tolerant.
///
/// Canceling after the callback has already fired is a no-op; the waiters
/// the callback woke stay woken.
#[derive(Clone)]
pub struct TimerHandle {
    shared: Arc<TimerShared>,
}

impl TimerHandle {
    /// Cancels the entry. The callback is dropped so captured wakers are
    /// released without firing.
    pub fn cancel(&self) {
        self.shared.canceled.store(true, AtomicOrdering::Release);
        self.shared.callback.lock().take();
    }

    /// Returns true once the entry has been canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.shared.is_canceled()
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

struct TimerEntry {
    deadline: Time,
    generation: u64,
    shared: Arc<TimerShared>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl Eq for TimerEntry {}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first), with the
        // generation breaking ties FIFO.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A min-heap of cancelable timers ordered by deadline.
#[derive(Default)]
pub(crate) struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    next_generation: u64,
}

impl TimerHeap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Schedules `callback` for `deadline` and returns a cancel handle.
    pub(crate) fn insert(&mut self, deadline: Time, callback: TimerCallback) -> TimerHandle {
        let generation = self.next_generation;
        self.next_generation += 1;
        let shared = Arc::new(TimerShared::new(callback));
        self.heap.push(TimerEntry {
            deadline,
            generation,
            shared: Arc::clone(&shared),
        });
        TimerHandle { shared }
    }

    /// Returns the earliest live deadline, discarding canceled entries from
    /// the top of the heap.
    pub(crate) fn peek_deadline(&mut self) -> Option<Time> {
        while let Some(entry) = self.heap.peek() {
            if entry.shared.is_canceled() {
                self.heap.pop();
            } else {
                return Some(entry.deadline);
            }
        }
        None
    }

    /// Pops all entries with `deadline <= now`, skipping canceled ones.
    pub(crate) fn pop_expired(&mut self, now: Time) -> Vec<Arc<TimerShared>> {
        let mut expired = Vec::new();
        while let Some(entry) = self.heap.peek() {
            if entry.deadline > now {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                if !entry.shared.is_canceled() {
                    expired.push(entry.shared);
                }
            }
        }
        expired
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }
}

impl std::fmt::Debug for TimerHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHeap")
            .field("len", &self.heap.len())
            .finish_non_exhaustive()
    }
}
