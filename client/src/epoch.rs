//! Epoch-guarded deferred work
//!
//! Every delayed callback in a phone is scheduled through a [`ResetGuard`].
//! The guard stamps each timer with the epoch that was live when it was
//! scheduled. A reset advances the epoch by exactly one and drops every
//! outstanding timer, and a timer that was already taken off the queue when
//! the reset happened is still rejected by [`ResetGuard::admit`] because its
//! stamp no longer matches.
//!
//! Time is a caller-supplied millisecond counter so the guard can be driven by
//! a tokio interval in the binary and by plain integers in tests.

use log::{debug, info};
use std::collections::BTreeMap;

pub type Epoch = u64;

/// Handle for cancelling a scheduled callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// A callback taken off the queue, not yet executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<T> {
    pub id: TimerId,
    pub epoch: Epoch,
    pub task: T,
}

#[derive(Debug, Clone)]
struct Pending<T> {
    due_ms: u64,
    epoch: Epoch,
    task: T,
}

#[derive(Debug, Clone)]
pub struct ResetGuard<T> {
    epoch: Epoch,
    next_id: u64,
    pending: BTreeMap<TimerId, Pending<T>>,
}

impl<T> ResetGuard<T> {
    pub fn new() -> Self {
        Self {
            epoch: 0,
            next_id: 1,
            pending: BTreeMap::new(),
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Schedules `task` to fire `delay_ms` after `now_ms` under the current epoch
    pub fn schedule(&mut self, now_ms: u64, delay_ms: u64, task: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.pending.insert(
            id,
            Pending {
                due_ms: now_ms.saturating_add(delay_ms),
                epoch: self.epoch,
                task,
            },
        );
        id
    }

    /// Returns true if the timer was still pending
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Cancels every pending timer whose task matches `predicate`
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, pending| !predicate(&pending.task));
        before - self.pending.len()
    }

    /// Advances the epoch and drops all outstanding timers
    pub fn reset(&mut self) -> Epoch {
        let dropped = self.pending.len();
        self.pending.clear();
        self.epoch += 1;
        info!("Epoch advanced to {} ({} timers cancelled)", self.epoch, dropped);
        self.epoch
    }

    /// Removes and returns every timer due at `now_ms`, earliest first
    pub fn take_due(&mut self, now_ms: u64) -> Vec<Fired<T>> {
        let mut due: Vec<(u64, TimerId)> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.due_ms <= now_ms)
            .map(|(id, pending)| (pending.due_ms, *id))
            .collect();
        due.sort();

        due.into_iter()
            .filter_map(|(_, id)| {
                self.pending.remove(&id).map(|pending| Fired {
                    id,
                    epoch: pending.epoch,
                    task: pending.task,
                })
            })
            .collect()
    }

    /// Check-at-fire: yields the task only if it was scheduled in the live epoch
    pub fn admit(&self, fired: Fired<T>) -> Option<T> {
        if fired.epoch != self.epoch {
            debug!(
                "Dropping stale timer {:?} from epoch {} (live epoch {})",
                fired.id, fired.epoch, self.epoch
            );
            return None;
        }
        Some(fired.task)
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn next_due(&self) -> Option<u64> {
        self.pending.values().map(|pending| pending.due_ms).min()
    }
}

impl<T> Default for ResetGuard<T> {
    fn default() -> Self {
        Self::new()
    }
}
