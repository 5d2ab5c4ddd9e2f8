use super::{JoinHandle, TaskState};
use crate::error::{Error, Result};
use crate::runtime::context;
use crate::runtime::slab::Key;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::Waker;

/// Type-erased task body. The task's output value is written to the join
/// handle's slot, so the scheduler only sees success or failure.
pub(crate) type TaskFuture = Pin<Box<dyn Future<Output = Result<()>>>>;

/// Opaque identity of a task or scope.
///
/// Ids are keys into the runtime's task arena. The slot of a finished task
/// is reused once nothing observes it any more, but an id never resolves to
/// a later task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Key);

impl TaskId {
    pub(crate) fn from_key(key: Key) -> Self {
        TaskId(key)
    }

    #[cfg(test)]
    pub(crate) fn from_index(index: usize) -> Self {
        TaskId(Key {
            index,
            generation: 0,
        })
    }

    pub(crate) fn key(self) -> Key {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.generation {
            0 => write!(f, "task#{}", self.0.index),
            generation => write!(f, "task#{}.{}", self.0.index, generation),
        }
    }
}

/// What drives a node forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    /// A spawned task, polled by the scheduler.
    Task,
    /// A structured scope, polled inline by the future that owns it.
    Scope,
}

/// A node of the task tree.
///
/// Parent and child links are ids into the arena, so the tree owns no
/// references to itself. A link may outlive the node it points to.
pub(crate) struct TaskNode {
    pub(crate) kind: NodeKind,
    pub(crate) name: Option<String>,
    pub(crate) parent: Option<TaskId>,
    /// Terminal children are pruned in batches.
    pub(crate) children: Vec<TaskId>,

    /// Children that have not reached a terminal state yet.
    pub(crate) live_children: usize,

    pub(crate) state: TaskState,

    /// The body. `None` while the task is being polled, once it finished,
    /// and always for scopes.
    pub(crate) future: Option<TaskFuture>,

    /// Waker handed to the body on every poll. Cached so that
    /// `Waker::will_wake` can deduplicate registrations.
    pub(crate) waker: Option<Waker>,

    /// The body has been polled at least once.
    pub(crate) started: bool,

    /// Already sitting in the run queue.
    pub(crate) queued: bool,

    pub(crate) cancel_requested: bool,

    /// The body returned; the node is waiting for its children.
    pub(crate) body_done: bool,

    /// The body ended with `Error::Cancelled`.
    pub(crate) body_cancelled: bool,

    /// First failure of the body or of a child task.
    pub(crate) failure: Option<Error>,

    /// Join handles and scope owners waiting for the terminal state.
    pub(crate) waiters: Vec<Waker>,

    /// Join handles and scope futures still referring to this node. The
    /// node is released once it is terminal and this drops to zero.
    pub(crate) handles: usize,
}

impl TaskNode {
    pub(crate) fn new(
        kind: NodeKind,
        parent: Option<TaskId>,
        name: Option<String>,
        future: Option<TaskFuture>,
        waker: Option<Waker>,
    ) -> Self {
        Self {
            kind,
            name,
            parent,
            children: Vec::new(),
            live_children: 0,
            state: TaskState::Runnable,
            future,
            waker,
            started: false,
            queued: false,
            cancel_requested: false,
            body_done: false,
            body_cancelled: false,
            failure: None,
            waiters: Vec::new(),
            handles: 1,
        }
    }

    /// State to enter once the body and every child are done.
    pub(crate) fn terminal_state(&mut self) -> TaskState {
        if let Some(err) = self.failure.take() {
            TaskState::Failed(err)
        } else if self.body_cancelled || self.cancel_requested {
            TaskState::Cancelled
        } else {
            TaskState::Completed
        }
    }
}

/// Task factory for configuring a spawn.
///
/// # Examples
///
/// ```rust,ignore
/// let one = task::Builder::new()
///     .name("one")
///     .lazy()
///     .spawn(async { Ok(13) });
///
/// one.start();
/// ```
#[derive(Debug, Default)]
pub struct Builder {
    name: Option<String>,
    lazy: bool,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the task. The name shows up in the task's tracing span.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Registers the task without scheduling it.
    ///
    /// A lazy task runs once [`JoinHandle::start`] is called or its handle
    /// is awaited.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Spawns `future` as a child of the current task or scope.
    ///
    /// # Panics
    ///
    /// Panics if called outside the context of a running runtime.
    pub fn spawn<F, T>(self, future: F) -> JoinHandle<T>
    where
        F: Future<Output = Result<T>> + 'static,
        T: 'static,
    {
        let shared =
            context::runtime().expect("spawn must be called within the context of a runtime");

        shared.spawn(context::current_node(), self.name, self.lazy, future)
    }
}

/// Spawns a future as a child of the current task or scope.
///
/// The task is queued behind every task that is already runnable; `spawn`
/// never polls it synchronously.
///
/// # Panics
///
/// Panics if called outside the context of a running runtime.
pub fn spawn<F, T>(future: F) -> JoinHandle<T>
where
    F: Future<Output = Result<T>> + 'static,
    T: 'static,
{
    Builder::new().spawn(future)
}

/// Id of the task or scope currently being polled.
pub fn current() -> Option<TaskId> {
    context::current_node()
}

/// Name of the task currently being polled, falling back to its id.
///
/// Inside a scope this is the name of the task that owns the scope.
pub fn current_name() -> Option<String> {
    let id = context::current_node()?;
    let shared = context::runtime()?;

    Some(shared.display_name(id))
}

/// Returns `false` once the current task has been cancelled.
///
/// Long computations that never reach a suspension point use this to
/// cooperate with cancellation.
pub fn is_active() -> bool {
    !context::is_cancelled()
}

/// Fails with [`Error::Cancelled`] if the current task has been cancelled.
pub fn ensure_active() -> Result<()> {
    if context::is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}
