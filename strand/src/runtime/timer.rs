use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::task::Waker;
use std::time::Duration;

/// An entry in the runtime timer queue.
///
/// Deadlines are offsets from the runtime origin (see
/// [`Clock`](crate::Clock)). Entries with equal deadlines fire in
/// registration order.
struct TimerEntry {
    /// Offset at which the timer fires.
    deadline: Duration,

    /// Registration order, used as a tie-breaker.
    seq: u64,

    /// Waker to notify when the deadline is reached.
    waker: Waker,

    /// Set when the owning future is dropped before the timer fires.
    cancelled: Rc<Cell<bool>>,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for TimerEntry {
    /// Reversed so that `BinaryHeap<TimerEntry>` pops the earliest
    /// `(deadline, seq)` first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.deadline, other.seq).cmp(&(self.deadline, self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Handle to a registered timer. Dropping it cancels the timer.
#[derive(Debug)]
pub(crate) struct TimerKey {
    cancelled: Rc<Cell<bool>>,
}

impl Drop for TimerKey {
    fn drop(&mut self) {
        self.cancelled.set(true);
    }
}

/// Min-heap of pending timers.
#[derive(Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    next_seq: u64,
}

impl TimerQueue {
    /// Registers `waker` to be woken once the clock reaches `deadline`.
    pub(crate) fn insert(&mut self, deadline: Duration, waker: Waker) -> TimerKey {
        let cancelled = Rc::new(Cell::new(false));
        let seq = self.next_seq;
        self.next_seq += 1;

        self.heap.push(TimerEntry {
            deadline,
            seq,
            waker,
            cancelled: cancelled.clone(),
        });

        TimerKey { cancelled }
    }

    /// Earliest live deadline, discarding cancelled entries on the way.
    pub(crate) fn next_deadline(&mut self) -> Option<Duration> {
        while let Some(entry) = self.heap.peek() {
            if !entry.cancelled.get() {
                return Some(entry.deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Removes every live timer whose deadline is at or before `now`.
    pub(crate) fn pop_due(&mut self, now: Duration) -> Vec<Waker> {
        let mut due = Vec::new();

        while self.heap.peek().is_some_and(|entry| entry.deadline <= now) {
            let Some(entry) = self.heap.pop() else {
                break;
            };
            if !entry.cancelled.get() {
                due.push(entry.waker);
            }
        }

        due
    }

    /// Number of entries, cancelled ones included.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}
