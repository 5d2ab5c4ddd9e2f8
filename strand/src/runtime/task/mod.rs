//! Task primitives.
//!
//! This module defines how work is represented, spawned, observed and
//! grouped:
//! - task identity and lifecycle state,
//! - spawning (eager or lazy) as a child of the running task,
//! - join handles for awaiting a task's value or cancelling it,
//! - structured scopes that wait for every task spawned inside them,
//! - cooperative cancellation checks.
//!
//! Most users will interact with this module through [`spawn`],
//! [`scope`] and [`JoinHandle`].

pub(crate) mod handle;
pub(crate) mod scope;
pub(crate) mod state;
pub(crate) mod waker;

mod core;

pub(crate) use self::core::{NodeKind, TaskFuture, TaskNode};

pub use self::core::{Builder, TaskId, current, current_name, ensure_active, is_active, spawn};
pub use handle::{Join, JoinHandle};
pub use scope::{Scope, scope};
pub use state::{SuspendReason, TaskState};
