use crate::runtime::context;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use pin_project_lite::pin_project;

/// Wraps a future and measures the time it takes to complete.
///
/// The returned future resolves to a tuple containing:
/// - the output of the wrapped future,
/// - the time elapsed on the runtime clock since the first poll.
///
/// Timing starts on the **first poll**, not at construction time.
///
/// # Examples
///
/// ```rust,ignore
/// let (sum, elapsed) = instrumented(async { Ok(one.await? + two.await?) }).await;
/// println!("The answer is {} in {:?}", sum?, elapsed);
/// ```
pub fn instrumented<F>(future: F) -> Instrumented<F> {
    Instrumented {
        future,
        start: None,
    }
}

pin_project! {
    /// A future that measures the execution time of another future.
    ///
    /// Dropping it before completion discards the measurement.
    pub struct Instrumented<F> {
        #[pin]
        future: F,

        // Runtime clock reading at the first poll.
        start: Option<Duration>,
    }
}

impl<F: Future> Future for Instrumented<F> {
    type Output = (F::Output, Duration);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let shared = context::runtime().expect("Instrumented polled outside of runtime");

        let start = *this.start.get_or_insert_with(|| shared.now());

        match this.future.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(output) => Poll::Ready((output, shared.now().saturating_sub(start))),
        }
    }
}
