use crate::runtime::core::Shared;
use crate::runtime::task::{SuspendReason, TaskId};

use std::cell::{Cell, RefCell};
use std::rc::Rc;

thread_local! {
    /// Runtime driving the current thread, if any.
    ///
    /// Installed by `block_on`/`run` so that spawning, timers and channels
    /// can reach the scheduler without explicit parameter passing.
    static CURRENT_RUNTIME: RefCell<Option<Rc<Shared>>> = const { RefCell::new(None) };

    /// Innermost task or scope node being polled.
    ///
    /// Newly spawned tasks become children of this node, and suspension
    /// points consult its cancellation flag.
    static CURRENT_NODE: Cell<Option<TaskId>> = const { Cell::new(None) };

    /// Reason recorded by the last suspension point of the current poll.
    static SUSPEND_REASON: Cell<SuspendReason> = const { Cell::new(SuspendReason::Other) };
}

/// Restores the previous runtime when dropped.
pub(crate) struct RuntimeGuard {
    prev: Option<Rc<Shared>>,
}

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT_RUNTIME.with(|cell| *cell.borrow_mut() = prev);
    }
}

/// Installs `shared` as the current runtime until the guard is dropped.
pub(crate) fn enter_runtime(shared: Rc<Shared>) -> RuntimeGuard {
    let prev = CURRENT_RUNTIME.with(|cell| cell.borrow_mut().replace(shared));
    RuntimeGuard { prev }
}

/// Restores the previous node when dropped, including while unwinding.
struct NodeGuard {
    prev: Option<TaskId>,
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        CURRENT_NODE.with(|cell| cell.set(self.prev));
    }
}

/// Runs `f` with `id` as the current node.
pub(crate) fn enter_node<R>(id: TaskId, f: impl FnOnce() -> R) -> R {
    let prev = CURRENT_NODE.with(|cell| cell.replace(Some(id)));
    let _guard = NodeGuard { prev };
    f()
}

/// Returns the runtime driving this thread.
pub(crate) fn runtime() -> Option<Rc<Shared>> {
    CURRENT_RUNTIME.with(|cell| cell.borrow().clone())
}

/// Returns the node currently being polled.
pub(crate) fn current_node() -> Option<TaskId> {
    CURRENT_NODE.with(Cell::get)
}

/// Returns `true` if the node being polled has been cancelled.
///
/// Outside of a runtime nothing can be cancelled, so this is `false`.
pub(crate) fn is_cancelled() -> bool {
    let Some(id) = current_node() else {
        return false;
    };

    runtime().is_some_and(|shared| shared.is_cancel_requested(id))
}

/// Records why the current poll is about to return `Poll::Pending`.
pub(crate) fn suspend(reason: SuspendReason) {
    SUSPEND_REASON.with(|cell| cell.set(reason));
}

/// Takes the reason recorded during the last poll, resetting it.
pub(crate) fn take_suspend_reason() -> SuspendReason {
    SUSPEND_REASON.with(|cell| cell.replace(SuspendReason::Other))
}
