//! Error type shared by every runtime primitive.
//!
//! Channels, timers, join handles and scopes all report failures through
//! [`Error`]. Cancellation is part of the same enum so that it can be
//! propagated with `?` through suspension points, but the scheduler never
//! treats it as a failure: a task whose body returns [`Error::Cancelled`]
//! ends in the `Cancelled` state.

use crate::runtime::task::TaskId;

use std::sync::Arc;
use std::time::Duration;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the runtime.
///
/// `Error` is `Clone` because a failed task is observed by its join handles
/// and by its parent scope.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The channel was closed before or while the operation was waiting.
    #[error("channel is closed")]
    ChannelClosed,

    /// A [`with_timeout`](crate::time::with_timeout) deadline elapsed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The current task (or scope) was cancelled.
    ///
    /// This is a control signal unwound through suspension points rather
    /// than a failure.
    #[error("task was cancelled")]
    Cancelled,

    /// A task ended with an uncaught error.
    #[error("task {task} failed: {source}")]
    TaskFailed {
        /// The task whose body produced the error.
        task: TaskId,
        /// The error returned (or raised) by the task body.
        #[source]
        source: Box<Error>,
    },

    /// A task panicked while being polled.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// `block_on` ran out of runnable tasks and pending timers before the
    /// root task finished.
    #[error("runtime stalled with {suspended} suspended task(s)")]
    Stalled {
        /// Number of non-terminal tasks when the stall was detected.
        suspended: usize,
    },

    /// An application error raised from a task body.
    #[error("{0}")]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps an application error.
    pub fn other<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Other(Arc::from(err.into()))
    }

    /// Returns `true` for the cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns `true` if a timeout elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// Returns the innermost error of a [`Error::TaskFailed`] chain.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::TaskFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Attributes an uncaught error to `task`.
    ///
    /// Errors that already carry a task attribution are kept as they are so
    /// that a failure keeps the identity of the task that raised it while it
    /// travels up the task tree.
    pub(crate) fn into_task_failure(self, task: TaskId) -> Error {
        match self {
            Error::TaskFailed { .. } => self,
            other => Error::TaskFailed {
                task,
                source: Box::new(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_failure_is_attributed_once() {
        let first = Error::other("boom").into_task_failure(TaskId::from_index(3));
        let again = first.clone().into_task_failure(TaskId::from_index(1));

        match again {
            Error::TaskFailed { task, .. } => assert_eq!(task, TaskId::from_index(3)),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(first.root_cause().to_string(), "boom");
    }

    #[test]
    fn display_includes_cause() {
        let err = Error::ChannelClosed.into_task_failure(TaskId::from_index(7));
        assert_eq!(err.to_string(), "task task#7 failed: channel is closed");
    }
}
