use super::{SuspendReason, TaskId, TaskState};
use crate::error::{Error, Result};
use crate::runtime::context;
use crate::runtime::core::Shared;

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;

/// Runs `body` as a structured scope.
///
/// Every task spawned while `body` is being polled becomes a child of the
/// scope. The scope completes once `body` has returned **and** all of
/// those children are terminal:
/// - if a child task fails, the scope cancels its remaining children and
///   its body, then resolves to the child's error,
/// - if the enclosing task is cancelled, the scope and its children are
///   cancelled with it,
/// - dropping an unfinished scope cancels its children.
///
/// A scope is a suspension point while it waits for its children.
///
/// # Examples
///
/// ```rust,ignore
/// let sum = strand::scope(async {
///     let one = strand::spawn(do_something_useful_one());
///     let two = strand::spawn(do_something_useful_two());
///     Ok(one.await? + two.await?)
/// })
/// .await?;
/// ```
pub fn scope<F, T>(body: F) -> Scope<F, T>
where
    F: Future<Output = Result<T>>,
{
    Scope {
        body,
        node: None,
        shared: None,
        output: None,
        body_done: false,
        finished: false,
    }
}

pin_project! {
    /// Future returned by [`scope`].
    pub struct Scope<F, T> {
        #[pin]
        body: F,

        // Registered on first poll, as a child of the node polling it.
        node: Option<TaskId>,
        shared: Option<Rc<Shared>>,

        output: Option<T>,
        body_done: bool,
        finished: bool,
    }

    impl<F, T> PinnedDrop for Scope<F, T> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();

            if let (Some(shared), Some(id)) = (this.shared.as_ref(), *this.node) {
                if !*this.finished {
                    if !*this.body_done {
                        shared.complete_body(id, Err(Error::Cancelled));
                    }
                    shared.cancel(id);
                }
                shared.release(id);
            }
        }
    }
}

impl<F, T> Scope<F, T> {
    /// Id of the scope node, once the scope has been polled.
    pub fn id(&self) -> Option<TaskId> {
        self.node
    }
}

impl<F, T> Future for Scope<F, T>
where
    F: Future<Output = Result<T>>,
{
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        assert!(!*this.finished, "`Scope` polled after completion");

        let shared = this
            .shared
            .get_or_insert_with(|| context::runtime().expect("scope polled outside of a runtime"))
            .clone();
        let id = *this
            .node
            .get_or_insert_with(|| shared.open_scope(context::current_node()));

        if !*this.body_done {
            let body = this.body.as_mut();

            match context::enter_node(id, || body.poll(cx)) {
                Poll::Ready(Ok(value)) => {
                    *this.output = Some(value);
                    *this.body_done = true;
                    shared.complete_body(id, Ok(()));
                }
                Poll::Ready(Err(err)) => {
                    *this.body_done = true;
                    shared.complete_body(id, Err(err));
                }
                Poll::Pending => {
                    shared.register_waiter(id, cx.waker());
                    return Poll::Pending;
                }
            }
        }

        let result = match shared.state(id) {
            Some(TaskState::Completed) => this.output.take().ok_or(Error::Cancelled),
            Some(TaskState::Cancelled) | None => Err(Error::Cancelled),
            Some(TaskState::Failed(err)) => Err(err),
            Some(_) => {
                shared.register_waiter(id, cx.waker());
                context::suspend(SuspendReason::Children);
                return Poll::Pending;
            }
        };

        *this.finished = true;
        Poll::Ready(result)
    }
}
