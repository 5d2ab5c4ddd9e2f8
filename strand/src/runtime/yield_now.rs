use crate::error::{Error, Result};
use crate::runtime::context;
use crate::runtime::task::SuspendReason;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A future that yields execution back to the scheduler exactly once.
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = Result<()>;

    /// On the first poll the task re-queues itself behind every runnable
    /// task and returns `Poll::Pending`. On the second poll it completes.
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if context::is_cancelled() {
            return Poll::Ready(Err(Error::Cancelled));
        }

        if !self.0 {
            self.0 = true;
            cx.waker().wake_by_ref();
            context::suspend(SuspendReason::Yield);
            return Poll::Pending;
        }

        Poll::Ready(Ok(()))
    }
}

/// Yields execution back to the scheduler.
///
/// This allows other tasks to make progress before the current task
/// continues. It is a suspension point, so it fails with
/// [`Error::Cancelled`] once the current task has been cancelled.
///
/// # Examples
///
/// ```rust,ignore
/// for chunk in work {
///     process(chunk);
///     strand::yield_now().await?;
/// }
/// ```
pub async fn yield_now() -> Result<()> {
    YieldOnce(false).await
}
