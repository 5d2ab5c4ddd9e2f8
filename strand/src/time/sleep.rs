use crate::error::{Error, Result};
use crate::runtime::context;
use crate::runtime::task::SuspendReason;
use crate::runtime::timer::TimerKey;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// Creates a future that completes after the given duration.
///
/// The deadline is taken from the runtime clock on first poll. `delay` is a
/// suspension point: it fails with [`Error::Cancelled`] as soon as the
/// current task is cancelled.
///
/// # Panics
///
/// Panics if polled outside of a running runtime.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
///
/// delay(Duration::from_millis(10)).await?;
/// ```
pub fn delay(duration: Duration) -> Delay {
    Delay {
        duration,
        deadline: None,
        timer: None,
    }
}

/// Future returned by [`delay`].
///
/// Dropping it before completion cancels its timer.
#[derive(Debug)]
pub struct Delay {
    duration: Duration,

    /// Offset from the runtime origin, set on first poll.
    deadline: Option<Duration>,

    timer: Option<TimerKey>,
}

impl Future for Delay {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if context::is_cancelled() {
            this.timer = None;
            return Poll::Ready(Err(Error::Cancelled));
        }

        let shared = context::runtime().expect("Delay polled outside of runtime");
        let now = shared.now();
        let deadline = *this.deadline.get_or_insert(now + this.duration);

        if now >= deadline {
            this.timer = None;
            return Poll::Ready(Ok(()));
        }

        if this.timer.is_none() {
            this.timer = Some(shared.insert_timer(deadline, cx.waker().clone()));
        }

        context::suspend(SuspendReason::Delay);
        Poll::Pending
    }
}
