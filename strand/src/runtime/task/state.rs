use crate::error::Error;

/// Why a task is not currently runnable.
///
/// The reason is recorded by the last suspension point reached during a
/// poll that returned `Poll::Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    /// Waiting for a receiver (channel full or rendezvous).
    Send,
    /// Waiting for a value (channel empty).
    Receive,
    /// Waiting for a timer.
    Delay,
    /// Waiting for another task or scope to finish.
    Join,
    /// Yielded voluntarily and already queued again.
    Yield,
    /// The body finished; waiting for children to reach a terminal state.
    Children,
    /// Spawned lazily and not started yet.
    Lazy,
    /// Pending on a future that is not a runtime primitive.
    Other,
}

/// Lifecycle state of a task.
///
/// A task moves between `Runnable` and `Suspended` any number of times and
/// reaches exactly one of the terminal states `Completed`, `Cancelled` or
/// `Failed`. Once terminal it is never polled again.
#[derive(Debug, Clone)]
pub enum TaskState {
    /// Queued for execution or currently being polled.
    Runnable,

    /// Waiting for the given condition.
    Suspended(SuspendReason),

    /// The body and all children finished successfully.
    Completed,

    /// The task was cancelled.
    Cancelled,

    /// The body or one of its children failed.
    Failed(Error),
}

impl TaskState {
    /// Returns `true` for `Completed`, `Cancelled` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Cancelled | TaskState::Failed(_)
        )
    }

    /// Returns `true` if the task is suspended, whatever the reason.
    pub fn is_suspended(&self) -> bool {
        matches!(self, TaskState::Suspended(_))
    }
}
