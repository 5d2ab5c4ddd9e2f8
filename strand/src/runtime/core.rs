use super::builder::Clock;
use super::context;
use super::slab::Slab;
use super::task::waker::{WakeQueue, make_waker};
use super::task::{JoinHandle, NodeKind, SuspendReason, TaskFuture, TaskId, TaskNode, TaskState};
use super::timer::{TimerKey, TimerQueue};
use crate::error::{Error, Result};

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

/// Time source of a runtime. All readings are offsets from `origin`.
struct ClockSource {
    kind: Clock,
    origin: Instant,
    elapsed: Cell<Duration>,
}

impl ClockSource {
    fn new(kind: Clock) -> Self {
        Self {
            kind,
            origin: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
        }
    }

    fn now(&self) -> Duration {
        match self.kind {
            Clock::System => self.origin.elapsed(),
            Clock::Virtual => self.elapsed.get(),
        }
    }

    /// Moves the clock forward to `deadline`, sleeping if it is a wall clock.
    fn advance_to(&self, deadline: Duration) {
        match self.kind {
            Clock::System => {
                let now = self.origin.elapsed();
                if deadline > now {
                    thread::sleep(deadline - now);
                }
            }
            Clock::Virtual => {
                if deadline > self.elapsed.get() {
                    self.elapsed.set(deadline);
                }
            }
        }
    }
}

/// Dead entries tolerated in a `children` list before it is pruned.
const PRUNE_SLACK: usize = 16;

/// Drops terminal and released children from the list of `parent`.
fn prune_children(tasks: &mut Slab<TaskNode>, parent: TaskId) {
    let Some(node) = tasks.get_mut(parent.key()) else {
        return;
    };
    let children = std::mem::take(&mut node.children);

    let live: Vec<TaskId> = children
        .into_iter()
        .filter(|child| {
            tasks
                .get(child.key())
                .is_some_and(|child| !child.state.is_terminal())
        })
        .collect();

    if let Some(node) = tasks.get_mut(parent.key()) {
        node.children = live;
    }
}

/// How a call to [`Shared::drive`] ended.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Drive {
    /// The stop condition became true.
    Done,
    /// Nothing is runnable and no timer is pending.
    Idle,
}

/// State shared by the runtime, its join handles, and the primitives that
/// run inside it.
///
/// Every field is only touched from the thread that owns the runtime;
/// borrows are never held across a poll.
pub(crate) struct Shared {
    /// Task arena, keyed by `TaskId`.
    tasks: RefCell<Slab<TaskNode>>,

    /// Tasks ready to be polled, oldest first.
    run_queue: RefCell<VecDeque<TaskId>>,

    /// Wake-ups recorded by wakers, spawns and cancellations.
    woken: WakeQueue,

    timers: RefCell<TimerQueue>,

    clock: ClockSource,

    /// First failure of a top-level task not yet reported by `run`.
    top_failure: RefCell<Option<Error>>,

    /// Root task of the ongoing `block_on`, whose failure goes to its caller.
    root: Cell<Option<TaskId>>,
}

impl Shared {
    fn new(clock: Clock) -> Self {
        Self {
            tasks: RefCell::new(Slab::default()),
            run_queue: RefCell::new(VecDeque::new()),
            woken: WakeQueue::default(),
            timers: RefCell::new(TimerQueue::default()),
            clock: ClockSource::new(clock),
            top_failure: RefCell::new(None),
            root: Cell::new(None),
        }
    }

    /// Current offset from the runtime origin.
    pub(crate) fn now(&self) -> Duration {
        self.clock.now()
    }

    pub(crate) fn insert_timer(&self, deadline: Duration, waker: Waker) -> TimerKey {
        self.timers.borrow_mut().insert(deadline, waker)
    }

    pub(crate) fn state(&self, id: TaskId) -> Option<TaskState> {
        self.tasks
            .borrow()
            .get(id.key())
            .map(|node| node.state.clone())
    }

    pub(crate) fn is_terminal(&self, id: TaskId) -> bool {
        self.tasks
            .borrow()
            .get(id.key())
            .is_some_and(|node| node.state.is_terminal())
    }

    pub(crate) fn is_cancel_requested(&self, id: TaskId) -> bool {
        self.tasks
            .borrow()
            .get(id.key())
            .is_some_and(|node| node.cancel_requested)
    }

    /// Name of the task owning `id` (scopes resolve to their owner).
    pub(crate) fn display_name(&self, id: TaskId) -> String {
        let tasks = self.tasks.borrow();
        let mut current = id;

        while let Some(node) = tasks.get(current.key()) {
            match (node.kind, node.parent) {
                (NodeKind::Scope, Some(parent)) => current = parent,
                _ => break,
            }
        }

        tasks
            .get(current.key())
            .and_then(|node| node.name.clone())
            .unwrap_or_else(|| current.to_string())
    }

    /// Number of tasks and scopes that have not reached a terminal state.
    pub(crate) fn live_count(&self) -> usize {
        self.tasks
            .borrow()
            .iter()
            .filter(|(_, node)| !node.state.is_terminal())
            .count()
    }

    /// Registers a task running `future` under `parent`.
    pub(crate) fn spawn<F, T>(
        self: &Rc<Self>,
        parent: Option<TaskId>,
        name: Option<String>,
        lazy: bool,
        future: F,
    ) -> JoinHandle<T>
    where
        F: Future<Output = Result<T>> + 'static,
        T: 'static,
    {
        let output = Rc::new(RefCell::new(None));
        let slot = output.clone();

        let body: TaskFuture = Box::pin(async move {
            let value = future.await?;
            *slot.borrow_mut() = Some(value);
            Ok(())
        });

        let id = self.insert_node(NodeKind::Task, parent, name, Some(body), lazy);
        JoinHandle::new(id, self.clone(), output)
    }

    /// Registers a scope node under `parent`. The caller polls its body.
    pub(crate) fn open_scope(&self, parent: Option<TaskId>) -> TaskId {
        self.insert_node(NodeKind::Scope, parent, None, None, false)
    }

    fn insert_node(
        &self,
        kind: NodeKind,
        parent: Option<TaskId>,
        name: Option<String>,
        future: Option<TaskFuture>,
        lazy: bool,
    ) -> TaskId {
        let mut tasks = self.tasks.borrow_mut();

        // A child of a cancelled node starts cancelled and never runs its body.
        let cancelled = parent
            .and_then(|parent| tasks.get(parent.key()))
            .is_some_and(|parent| parent.cancel_requested);

        let id = TaskId::from_key(tasks.insert_with(|key| {
            let id = TaskId::from_key(key);
            let waker = match kind {
                NodeKind::Task => Some(make_waker(id, self.woken.clone())),
                NodeKind::Scope => None,
            };

            let mut node = TaskNode::new(kind, parent, name, future, waker);
            node.cancel_requested = cancelled;
            if lazy && !cancelled {
                node.state = TaskState::Suspended(SuspendReason::Lazy);
            }
            node
        }));

        let schedule = kind == NodeKind::Task && !(lazy && !cancelled);

        if let Some(parent) = parent.and_then(|parent| tasks.get_mut(parent.key())) {
            parent.children.push(id);
            parent.live_children += 1;
        }

        drop(tasks);

        trace!(task = %id, parent = ?parent, ?kind, lazy, "registered");

        if schedule {
            self.woken.push(id);
        }

        id
    }

    /// Schedules a lazy task. Returns `false` if it was already started.
    pub(crate) fn start(&self, id: TaskId) -> bool {
        let mut tasks = self.tasks.borrow_mut();
        let Some(node) = tasks.get_mut(id.key()) else {
            return false;
        };

        if !matches!(node.state, TaskState::Suspended(SuspendReason::Lazy)) || node.started {
            return false;
        }

        node.state = TaskState::Runnable;
        drop(tasks);

        self.woken.push(id);
        true
    }

    /// Drops one handle to `id`. A terminal node without handles is removed
    /// from the arena and its slot becomes reusable.
    pub(crate) fn release(&self, id: TaskId) {
        let released = {
            let mut tasks = self.tasks.borrow_mut();
            let Some(node) = tasks.get_mut(id.key()) else {
                return;
            };

            node.handles = node.handles.saturating_sub(1);

            if node.handles == 0 && node.state.is_terminal() {
                tasks.remove(id.key())
            } else {
                None
            }
        };

        drop(released);
    }

    /// Adds `waker` to the waiters of `id` unless it is already there.
    pub(crate) fn register_waiter(&self, id: TaskId, waker: &Waker) {
        let mut tasks = self.tasks.borrow_mut();
        let Some(node) = tasks.get_mut(id.key()) else {
            return;
        };

        if !node.waiters.iter().any(|w| w.will_wake(waker)) {
            node.waiters.push(waker.clone());
        }
    }

    /// Cancels `id` and every non-terminal descendant.
    ///
    /// Tasks are rescheduled so that their pending suspension point resolves
    /// to [`Error::Cancelled`]; scope owners are woken for the same reason.
    pub(crate) fn cancel(&self, id: TaskId) {
        let mut reschedule = Vec::new();
        let mut owners = Vec::new();

        {
            let mut tasks = self.tasks.borrow_mut();
            let mut pending = VecDeque::from([id]);

            while let Some(current) = pending.pop_front() {
                let Some(node) = tasks.get_mut(current.key()) else {
                    continue;
                };

                if node.state.is_terminal() || node.cancel_requested {
                    continue;
                }

                node.cancel_requested = true;

                match node.kind {
                    NodeKind::Task => reschedule.push(current),
                    NodeKind::Scope => owners.append(&mut node.waiters),
                }

                pending.extend(node.children.iter().copied());
            }
        }

        if !reschedule.is_empty() || !owners.is_empty() {
            debug!(task = %id, tasks = reschedule.len(), "cancelled");
        }

        for task in reschedule {
            self.woken.push(task);
        }
        for owner in owners {
            owner.wake();
        }
    }

    /// Cancels every top-level task that is still running.
    fn cancel_top_level(&self) {
        let roots: Vec<TaskId> = self
            .tasks
            .borrow()
            .iter()
            .filter(|(_, node)| {
                node.parent.is_none() && node.kind == NodeKind::Task && !node.state.is_terminal()
            })
            .map(|(key, _)| TaskId::from_key(key))
            .collect();

        for root in roots {
            self.cancel(root);
        }
    }

    /// Records the outcome of the body of `id`.
    ///
    /// The node becomes terminal right away when it has no live children,
    /// otherwise once the last child terminates. A failing or cancelled
    /// body cancels its children first.
    pub(crate) fn complete_body(&self, id: TaskId, result: Result<()>) {
        let (cancel_children, finalize) = {
            let mut tasks = self.tasks.borrow_mut();
            let Some(node) = tasks.get_mut(id.key()) else {
                return;
            };

            node.body_done = true;

            let cancel_children = match result {
                Ok(()) => false,
                Err(Error::Cancelled) => {
                    node.body_cancelled = true;
                    true
                }
                Err(err) => {
                    if node.failure.is_none() {
                        node.failure = Some(match node.kind {
                            NodeKind::Task => err.into_task_failure(id),
                            NodeKind::Scope => err,
                        });
                    }
                    true
                }
            };

            let finalize = node.live_children == 0;
            if !finalize {
                node.state = TaskState::Suspended(SuspendReason::Children);
            }

            (cancel_children && !finalize, finalize)
        };

        if cancel_children {
            self.cancel(id);
        }

        if finalize {
            self.finalize(id);
        }
    }

    /// Moves `id` to its terminal state and notifies waiters and parent.
    ///
    /// A node nobody holds a handle to is released right away.
    fn finalize(&self, id: TaskId) {
        let (state, kind, parent, waiters, released) = {
            let mut tasks = self.tasks.borrow_mut();
            let Some(node) = tasks.get_mut(id.key()) else {
                return;
            };

            let state = node.terminal_state();
            node.state = state.clone();

            let future = node.future.take();
            let kind = node.kind;
            let parent = node.parent;
            let waiters = std::mem::take(&mut node.waiters);

            let released = match node.handles {
                0 => tasks.remove(id.key()),
                _ => None,
            };

            (state, kind, parent, waiters, (future, released))
        };

        // Bodies may own join handles, which release nodes on drop.
        drop(released);

        match &state {
            TaskState::Failed(err) => debug!(task = %id, %err, "failed"),
            other => trace!(task = %id, state = ?other, "terminated"),
        }

        for waiter in waiters {
            waiter.wake();
        }

        match parent {
            Some(parent) => self.child_terminated(parent, kind, &state),
            None if self.root.get() == Some(id) => {}
            None => {
                if let (NodeKind::Task, TaskState::Failed(err)) = (kind, &state) {
                    self.top_failure.borrow_mut().get_or_insert_with(|| err.clone());
                }
            }
        }
    }

    /// Bookkeeping on `parent` after one of its children terminated.
    ///
    /// A failed child task cancels its parent (and through it every
    /// sibling); the parent later fails with the same error. Scopes report
    /// their failure to the awaiting code instead.
    fn child_terminated(&self, parent: TaskId, child_kind: NodeKind, state: &TaskState) {
        let (cancel_parent, finalize_parent) = {
            let mut tasks = self.tasks.borrow_mut();
            let Some(node) = tasks.get_mut(parent.key()) else {
                return;
            };

            node.live_children -= 1;

            if node.children.len() > 2 * node.live_children + PRUNE_SLACK {
                prune_children(&mut tasks, parent);
            }

            let Some(node) = tasks.get_mut(parent.key()) else {
                return;
            };

            let mut cancel_parent = false;
            if let (NodeKind::Task, TaskState::Failed(err)) = (child_kind, state) {
                if node.failure.is_none() {
                    node.failure = Some(err.clone());
                }
                cancel_parent = true;
            }

            let finalize_parent =
                node.body_done && node.live_children == 0 && !node.state.is_terminal();

            (cancel_parent, finalize_parent)
        };

        if cancel_parent {
            self.cancel(parent);
        }

        if finalize_parent {
            self.finalize(parent);
        }
    }

    /// Moves woken tasks into the run queue, preserving wake order.
    fn drain_woken(&self) {
        let woken = self.woken.drain();
        if woken.is_empty() {
            return;
        }

        let mut tasks = self.tasks.borrow_mut();
        let mut run_queue = self.run_queue.borrow_mut();

        for id in woken {
            let Some(node) = tasks.get_mut(id.key()) else {
                continue;
            };

            if node.queued || node.future.is_none() {
                continue;
            }

            if matches!(node.state, TaskState::Suspended(SuspendReason::Lazy))
                && !node.cancel_requested
            {
                continue;
            }

            node.queued = true;
            run_queue.push_back(id);
        }
    }

    fn fire_due_timers(&self) {
        let now = self.clock.now();
        let due = self.timers.borrow_mut().pop_due(now);

        if !due.is_empty() {
            trace!(?now, count = due.len(), "timers fired");
        }

        for waker in due {
            waker.wake();
        }
    }

    /// Advances the clock to the next pending timer.
    fn advance_clock(&self) -> bool {
        let next = self.timers.borrow_mut().next_deadline();
        let Some(deadline) = next else {
            return false;
        };

        self.clock.advance_to(deadline);
        true
    }

    /// Polls task `id` once.
    fn poll_task(&self, id: TaskId) {
        let (mut future, waker, skip, span) = {
            let mut tasks = self.tasks.borrow_mut();
            let Some(node) = tasks.get_mut(id.key()) else {
                return;
            };

            node.queued = false;

            let Some(future) = node.future.take() else {
                return;
            };
            let Some(waker) = node.waker.clone() else {
                node.future = Some(future);
                return;
            };

            let skip = !node.started && node.cancel_requested;
            node.started = true;
            node.state = TaskState::Runnable;

            let span = tracing::info_span!("task", id = %id, name = tracing::field::Empty);
            if let Some(name) = &node.name {
                span.record("name", name.as_str());
            }

            (future, waker, skip, span)
        };

        if skip {
            trace!(task = %id, "cancelled before start");
            drop(future);
            self.complete_body(id, Err(Error::Cancelled));
            return;
        }

        let _enter = span.enter();
        let mut cx = Context::from_waker(&waker);

        context::take_suspend_reason();

        let poll = context::enter_node(id, || {
            panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)))
        });

        match poll {
            Ok(Poll::Pending) => {
                let reason = context::take_suspend_reason();
                let mut tasks = self.tasks.borrow_mut();
                if let Some(node) = tasks.get_mut(id.key()) {
                    node.future = Some(future);
                    node.state = TaskState::Suspended(reason);
                }
            }
            Ok(Poll::Ready(result)) => {
                drop(future);
                self.complete_body(id, result);
            }
            Err(payload) => {
                drop(future);
                let message = panic_message(payload.as_ref());
                error!(task = %id, %message, "task panicked");
                self.complete_body(id, Err(Error::Panicked(message)));
            }
        }
    }

    /// Runs tasks FIFO, firing timers whenever the run queue is empty,
    /// until `done` holds or nothing can make progress.
    pub(crate) fn drive(&self, mut done: impl FnMut(&Self) -> bool) -> Drive {
        loop {
            if done(self) {
                return Drive::Done;
            }

            self.fire_due_timers();
            self.drain_woken();

            let next = self.run_queue.borrow_mut().pop_front();
            match next {
                Some(id) => self.poll_task(id),
                None => {
                    if !self.advance_clock() {
                        return if done(self) { Drive::Done } else { Drive::Idle };
                    }
                }
            }
        }
    }

    fn take_top_failure(&self) -> Option<Error> {
        self.top_failure.borrow_mut().take()
    }

    /// Drops every task body. Bodies may own join handles, which keep this
    /// structure alive, so this breaks reference cycles on shutdown.
    fn clear(&self) {
        let futures: Vec<TaskFuture> = self
            .tasks
            .borrow_mut()
            .values_mut()
            .filter_map(|node| node.future.take())
            .collect();

        drop(futures);
        self.run_queue.borrow_mut().clear();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// The main runtime handle.
///
/// `Runtime` owns the task arena, the run queue and the timer queue. It is
/// single-threaded: tasks never need to be `Send`, and the runtime itself
/// is `!Send`.
///
/// Dropping the runtime drops every task that has not finished.
pub struct Runtime {
    shared: Rc<Shared>,
}

impl Runtime {
    pub(crate) fn new(clock: Clock) -> Self {
        Self {
            shared: Rc::new(Shared::new(clock)),
        }
    }

    /// Spawns a top-level task.
    ///
    /// The task runs the next time the runtime is driven by
    /// [`run`](Self::run) or [`block_on`](Self::block_on).
    pub fn spawn<F, T>(&self, future: F) -> JoinHandle<T>
    where
        F: Future<Output = Result<T>> + 'static,
        T: 'static,
    {
        self.shared.spawn(None, None, false, future)
    }

    /// Runs `future` as the root task and drives the runtime until the root
    /// and all of its children reach a terminal state.
    ///
    /// # Errors
    ///
    /// Returns the root's error, [`Error::Cancelled`] if it was cancelled,
    /// or [`Error::Stalled`] if every remaining task is suspended with no
    /// timer pending. A stalled root is cancelled before returning.
    ///
    /// Failures of other top-level tasks observed meanwhile are logged and
    /// discarded; a later [`run`](Self::run) does not report them.
    ///
    /// # Panics
    ///
    /// Panics if called from inside a task.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let runtime = strand::RuntimeBuilder::new().build();
    /// let answer = runtime.block_on(async { Ok(42) });
    /// assert_eq!(answer.unwrap(), 42);
    /// ```
    pub fn block_on<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + 'static,
        T: 'static,
    {
        assert!(
            context::current_node().is_none(),
            "block_on cannot be called from within a task"
        );

        let _guard = context::enter_runtime(self.shared.clone());
        let root = self.spawn(future);

        self.shared.root.set(Some(root.id()));
        let result = self.drive_root(&root);
        self.shared.root.set(None);

        if let Some(err) = self.shared.take_top_failure() {
            warn!(%err, "top-level task failed during block_on");
        }

        result
    }

    fn drive_root<T>(&self, root: &JoinHandle<T>) -> Result<T> {
        let id = root.id();

        if self.shared.drive(|shared| shared.is_terminal(id)) == Drive::Idle {
            let suspended = self.shared.live_count();
            warn!(suspended, "runtime stalled, cancelling root task");

            self.shared.cancel(id);
            self.shared.drive(|shared| shared.is_terminal(id));

            return Err(Error::Stalled { suspended });
        }

        root.try_result().unwrap_or_else(|| {
            Err(Error::Stalled {
                suspended: self.shared.live_count(),
            })
        })
    }

    /// Drives every spawned task until none can make progress.
    ///
    /// Unlike [`block_on`](Self::block_on), running out of work while some
    /// tasks are still suspended is not an error: those tasks keep waiting
    /// (for a channel another driver may feed, say) and a `warn!` event
    /// reports how many there are.
    ///
    /// # Errors
    ///
    /// If a top-level task fails, the remaining top-level tasks are
    /// cancelled and drained, then the failure is returned.
    pub fn run(&self) -> Result<()> {
        assert!(
            context::current_node().is_none(),
            "run cannot be called from within a task"
        );

        let _guard = context::enter_runtime(self.shared.clone());

        self.shared
            .drive(|shared| shared.top_failure.borrow().is_some());

        if let Some(err) = self.shared.take_top_failure() {
            error!(%err, "top-level task failed, aborting run");

            self.shared.cancel_top_level();
            self.shared.drive(|_| false);

            return Err(err);
        }

        let suspended = self.shared.live_count();
        if suspended > 0 {
            warn!(suspended, "run ended with suspended tasks and no pending timer");
        }

        Ok(())
    }

    /// Cancels task `id` and all of its descendants.
    pub fn cancel(&self, id: TaskId) {
        self.shared.cancel(id);
    }

    /// Current state of task `id`, or `None` for an unknown id.
    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.shared.state(id)
    }

    /// Time elapsed on the runtime clock.
    pub fn now(&self) -> Duration {
        self.shared.now()
    }

    /// Number of tasks and scopes that are not terminal yet.
    pub fn live_tasks(&self) -> usize {
        self.shared.live_count()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let _guard = context::enter_runtime(self.shared.clone());
        self.shared.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_tasks_give_their_slots_back() {
        let runtime = Runtime::new(Clock::Virtual);

        for _ in 0..5 {
            runtime
                .block_on(async {
                    for _ in 0..1_000 {
                        crate::spawn(async { crate::yield_now().await });
                    }
                    Ok(())
                })
                .unwrap();
        }

        let tasks = runtime.shared.tasks.borrow();
        assert_eq!(tasks.len(), 0);
        assert!(tasks.slots() <= 1_001, "arena grew to {}", tasks.slots());
    }

    #[test]
    fn parent_children_list_is_pruned() {
        let runtime = Runtime::new(Clock::Virtual);

        let root = runtime.spawn(async {
            for _ in 0..200 {
                crate::spawn(async { Ok(()) }).await?;
            }
            Ok(())
        });
        runtime.run().unwrap();

        let tasks = runtime.shared.tasks.borrow();
        let node = tasks.get(root.id().key()).unwrap();
        assert!(node.children.len() <= PRUNE_SLACK + 1, "{} children kept", node.children.len());
    }

    #[test]
    fn observed_task_outlives_its_completion() {
        let runtime = Runtime::new(Clock::Virtual);

        let handle = runtime.spawn(async { Ok(7) });
        runtime.run().unwrap();
        assert_eq!(runtime.shared.tasks.borrow().len(), 1);

        let id = handle.id();
        assert_eq!(handle.try_result().unwrap().unwrap(), 7);
        drop(handle);

        assert_eq!(runtime.shared.tasks.borrow().len(), 0);
        assert_eq!(runtime.state(id), None);
    }
}
