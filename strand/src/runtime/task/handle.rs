use super::{SuspendReason, TaskId, TaskState};
use crate::error::{Error, Result};
use crate::runtime::context;
use crate::runtime::core::Shared;

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// A handle to a spawned task.
///
/// Awaiting a `JoinHandle` waits until the task and all of its children
/// are terminal, then yields the task's value or its error: a cancelled
/// task resolves to [`Error::Cancelled`], a failed one to its
/// [`Error::TaskFailed`].
///
/// Awaiting is a suspension point: if the awaiting task is cancelled the
/// handle resolves to [`Error::Cancelled`] without waiting.
///
/// Dropping the `JoinHandle` does **not** cancel the task; it only
/// discards the ability to observe its result.
pub struct JoinHandle<T> {
    id: TaskId,
    shared: Rc<Shared>,
    output: Rc<RefCell<Option<T>>>,
}

impl<T> JoinHandle<T> {
    pub(crate) fn new(id: TaskId, shared: Rc<Shared>, output: Rc<RefCell<Option<T>>>) -> Self {
        Self { id, shared, output }
    }

    /// Id of the task.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Current state of the task.
    pub fn state(&self) -> TaskState {
        self.shared.state(self.id).unwrap_or(TaskState::Cancelled)
    }

    /// Returns `true` once the task reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.shared.is_terminal(self.id)
    }

    /// Starts a task spawned with [`Builder::lazy`](super::Builder::lazy).
    ///
    /// Returns `true` if this call started it.
    pub fn start(&self) -> bool {
        self.shared.start(self.id)
    }

    /// Cancels the task and all of its descendants.
    pub fn cancel(&self) {
        self.shared.cancel(self.id);
    }

    /// Waits for the task to reach a terminal state, whatever its outcome.
    pub fn join(&self) -> Join<'_> {
        Join {
            id: self.id,
            shared: &self.shared,
        }
    }

    /// Cancels the task, then waits for it to unwind.
    pub async fn cancel_and_join(&self) -> Result<()> {
        self.cancel();
        self.join().await
    }

    /// Result of a terminal task, `None` while it is still running.
    pub(crate) fn try_result(&self) -> Option<Result<T>> {
        match outcome(self.id, &self.shared, &self.output) {
            Poll::Ready(result) => Some(result),
            Poll::Pending => None,
        }
    }
}

fn outcome<T>(id: TaskId, shared: &Shared, output: &RefCell<Option<T>>) -> Poll<Result<T>> {
    match shared.state(id) {
        Some(TaskState::Completed) => {
            let value = output.borrow_mut().take().expect("task output already taken");
            Poll::Ready(Ok(value))
        }
        Some(TaskState::Cancelled) | None => Poll::Ready(Err(Error::Cancelled)),
        Some(TaskState::Failed(err)) => Poll::Ready(Err(err)),
        Some(_) => Poll::Pending,
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T>;

    /// Starts the task if it is lazy, then waits for its outcome.
    ///
    /// The waker is registered **before** the state is re-checked to avoid
    /// missed wake-ups.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if context::is_cancelled() {
            return Poll::Ready(Err(Error::Cancelled));
        }

        self.shared.start(self.id);

        if let Poll::Ready(result) = outcome(self.id, &self.shared, &self.output) {
            return Poll::Ready(result);
        }

        self.shared.register_waiter(self.id, cx.waker());

        if let Poll::Ready(result) = outcome(self.id, &self.shared, &self.output) {
            return Poll::Ready(result);
        }

        context::suspend(SuspendReason::Join);
        Poll::Pending
    }
}

impl<T> Drop for JoinHandle<T> {
    fn drop(&mut self) {
        self.shared.release(self.id);
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Future returned by [`JoinHandle::join`].
///
/// Resolves to `Ok(())` once the task is terminal, or to
/// [`Error::Cancelled`] if the waiting task is cancelled first.
pub struct Join<'a> {
    id: TaskId,
    shared: &'a Shared,
}

impl Future for Join<'_> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if context::is_cancelled() {
            return Poll::Ready(Err(Error::Cancelled));
        }

        self.shared.start(self.id);

        if self.shared.is_terminal(self.id) {
            return Poll::Ready(Ok(()));
        }

        self.shared.register_waiter(self.id, cx.waker());

        if self.shared.is_terminal(self.id) {
            return Poll::Ready(Ok(()));
        }

        context::suspend(SuspendReason::Join);
        Poll::Pending
    }
}
