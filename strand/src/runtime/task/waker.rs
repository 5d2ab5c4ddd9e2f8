use crate::runtime::task::TaskId;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Wake, Waker};

/// Queue of task ids woken since the scheduler last looked.
///
/// Wakers must be `Send + Sync`, so the queue lives behind a mutex even
/// though the scheduler itself is single-threaded. The scheduler drains it
/// after every poll, which keeps wake-ups in FIFO order.
#[derive(Clone, Default)]
pub(crate) struct WakeQueue {
    inner: Arc<Mutex<VecDeque<TaskId>>>,
}

impl WakeQueue {
    /// Records that `id` should be polled again.
    pub(crate) fn push(&self, id: TaskId) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(id);
    }

    /// Takes every pending wake-up, oldest first.
    pub(crate) fn drain(&self) -> Vec<TaskId> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}

/// Waker payload: the task to reschedule and where to record it.
struct TaskWaker {
    id: TaskId,
    queue: WakeQueue,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.queue.push(self.id);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.queue.push(self.id);
    }
}

/// Creates a [`Waker`] that reschedules task `id` when woken.
pub(crate) fn make_waker(id: TaskId, queue: WakeQueue) -> Waker {
    Waker::from(Arc::new(TaskWaker { id, queue }))
}
