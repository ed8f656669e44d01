//! Cancellable delayed-task queue
//!
//! The forwarder keeps every timer (pending-Interest expiry, dead nonce
//! sweeps, measurement cleanup) in one [`Scheduler`]. The host event loop
//! sleeps until [`Scheduler::next_deadline`] and then drains due tasks
//! with [`Scheduler::pop_due`].
//!
//! Timers never fire on their own: a stale timer must be cancelled
//! explicitly, otherwise it will still be returned when due.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

/// Handle to a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Delayed-task queue ordered by deadline
///
/// Tasks with equal deadlines fire in scheduling order.
#[derive(Debug)]
pub struct Scheduler<T> {
    queue: BinaryHeap<Reverse<(Instant, u64)>>,
    tasks: HashMap<u64, T>,
    next_id: u64,
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            tasks: HashMap::new(),
            next_id: 0,
        }
    }

    /// Schedule `task` to fire at `deadline`
    pub fn schedule(&mut self, deadline: Instant, task: T) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push(Reverse((deadline, id)));
        self.tasks.insert(id, task);
        TimerId(id)
    }

    /// Cancel a task, returning it if it had not fired yet
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        self.tasks.remove(&id.0)
    }

    /// Check whether a task is still waiting to fire
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.tasks.contains_key(&id.0)
    }

    /// Pop the earliest task whose deadline is at or before `now`
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerId, T)> {
        while let Some(Reverse((deadline, id))) = self.queue.peek().copied() {
            if deadline > now {
                return None;
            }
            self.queue.pop();
            if let Some(task) = self.tasks.remove(&id) {
                return Some((TimerId(id), task));
            }
        }
        None
    }

    /// Earliest deadline among pending tasks
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, id))) = self.queue.peek().copied() {
            if self.tasks.contains_key(&id) {
                return Some(deadline);
            }
            self.queue.pop();
        }
        None
    }

    /// Number of pending tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fires_in_deadline_order() {
        let t0 = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(t0 + Duration::from_millis(20), "b");
        scheduler.schedule(t0 + Duration::from_millis(10), "a");
        scheduler.schedule(t0 + Duration::from_millis(30), "c");

        assert_eq!(scheduler.next_deadline(), Some(t0 + Duration::from_millis(10)));
        assert!(scheduler.pop_due(t0).is_none());

        let now = t0 + Duration::from_millis(25);
        assert_eq!(scheduler.pop_due(now).map(|(_, t)| t), Some("a"));
        assert_eq!(scheduler.pop_due(now).map(|(_, t)| t), Some("b"));
        assert!(scheduler.pop_due(now).is_none());
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_equal_deadlines_fire_fifo() {
        let t0 = Instant::now();
        let mut scheduler = Scheduler::new();
        for i in 0..5 {
            scheduler.schedule(t0, i);
        }
        let fired: Vec<_> = std::iter::from_fn(|| scheduler.pop_due(t0).map(|(_, t)| t)).collect();
        assert_eq!(fired, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_cancel() {
        let t0 = Instant::now();
        let mut scheduler = Scheduler::new();
        let a = scheduler.schedule(t0, "a");
        let b = scheduler.schedule(t0 + Duration::from_millis(5), "b");

        assert!(scheduler.is_pending(a));
        assert_eq!(scheduler.cancel(a), Some("a"));
        assert_eq!(scheduler.cancel(a), None);
        assert!(!scheduler.is_pending(a));

        assert_eq!(scheduler.next_deadline(), Some(t0 + Duration::from_millis(5)));
        let (id, task) = scheduler.pop_due(t0 + Duration::from_secs(1)).unwrap();
        assert_eq!((id, task), (b, "b"));
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.next_deadline(), None);
    }
}
