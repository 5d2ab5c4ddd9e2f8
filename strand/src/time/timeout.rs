use crate::error::{Error, Result};
use crate::runtime::context;
use crate::runtime::task::{Scope, scope};
use crate::runtime::timer::TimerKey;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use pin_project_lite::pin_project;
use tracing::debug;

/// Runs `work` inside a scope and cancels it if it does not finish within
/// `duration`.
///
/// When the deadline passes, the scope is cancelled: every suspension
/// point `work` reaches from then on fails with [`Error::Cancelled`], tasks
/// spawned inside it are cancelled, and `work` keeps being polled until it
/// has unwound. Only then does the future resolve to [`Error::Timeout`],
/// so `Drop`-based cleanup inside `work` always runs before the caller sees
/// the timeout.
///
/// A non-cancellation error raised by `work` while unwinding is returned
/// instead of the timeout.
///
/// # Examples
///
/// ```rust,ignore
/// let result = with_timeout(Duration::from_millis(1300), async {
///     for i in 0..1000 {
///         println!("I'm sleeping {i} ...");
///         delay(Duration::from_millis(500)).await?;
///     }
///     Ok(())
/// })
/// .await;
///
/// assert!(matches!(result, Err(Error::Timeout(_))));
/// ```
pub fn with_timeout<F, T>(duration: Duration, work: F) -> Timeout<F, T>
where
    F: Future<Output = Result<T>>,
{
    Timeout {
        scope: scope(work),
        duration,
        deadline: None,
        timer: None,
        expired: false,
    }
}

/// Like [`with_timeout`], but resolves to `Ok(None)` when the deadline
/// passes.
pub async fn with_timeout_or_none<F, T>(duration: Duration, work: F) -> Result<Option<T>>
where
    F: Future<Output = Result<T>>,
{
    match with_timeout(duration, work).await {
        Ok(value) => Ok(Some(value)),
        Err(Error::Timeout(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

pin_project! {
    /// Future returned by [`with_timeout`].
    pub struct Timeout<F, T> {
        #[pin]
        scope: Scope<F, T>,

        duration: Duration,

        // Offset from the runtime origin, set on first poll.
        deadline: Option<Duration>,

        timer: Option<TimerKey>,

        // The scope has been cancelled by the deadline.
        expired: bool,
    }
}

impl<F, T> Future for Timeout<F, T>
where
    F: Future<Output = Result<T>>,
{
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        let shared = context::runtime().expect("Timeout polled outside of runtime");

        let deadline = *this
            .deadline
            .get_or_insert_with(|| shared.now() + *this.duration);

        if let Poll::Ready(result) = this.scope.as_mut().poll(cx) {
            *this.timer = None;
            return Poll::Ready(resolve(result, *this.expired, *this.duration));
        }

        if *this.expired {
            return Poll::Pending;
        }

        if shared.now() < deadline {
            if this.timer.is_none() {
                *this.timer = Some(shared.insert_timer(deadline, cx.waker().clone()));
            }
            return Poll::Pending;
        }

        *this.expired = true;
        *this.timer = None;

        debug!(duration = ?this.duration, "timed out, cancelling work");

        if let Some(id) = this.scope.id() {
            shared.cancel(id);
        }

        match this.scope.as_mut().poll(cx) {
            Poll::Ready(result) => Poll::Ready(resolve(result, true, *this.duration)),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn resolve<T>(result: Result<T>, expired: bool, duration: Duration) -> Result<T> {
    if !expired {
        return result;
    }

    match result {
        Err(err) if !err.is_cancelled() => Err(err),
        _ => Err(Error::Timeout(duration)),
    }
}
