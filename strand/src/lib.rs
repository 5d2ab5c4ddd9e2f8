//! # Strand
//!
//! **Strand** is a small single-threaded runtime for cooperative tasks that
//! talk to each other through channels.
//!
//! Tasks are ordinary Rust futures returning [`Result`]. They run on one
//! thread, in FIFO order, until they reach a suspension point: a channel
//! `send`/`recv`, a [`delay`](time::delay), awaiting a [`JoinHandle`] or a
//! [`scope`], or [`yield_now`]. On top of that Strand provides:
//!
//! - **Structured concurrency**: tasks spawned by a task are its children,
//!   a parent finishes only after its children, and a failing child
//!   cancels its siblings,
//! - **Cooperative cancellation** checked at every suspension point,
//! - **Timeouts** that cancel the work and wait for it to unwind before
//!   reporting [`Error::Timeout`],
//! - **Channels** in rendezvous, buffered and unbounded flavours,
//! - a **virtual clock** that makes timer-heavy code run instantly and
//!   deterministically.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strand::channel::Channel;
//! use strand::time::delay;
//! use std::time::Duration;
//!
//! #[strand::main]
//! async fn main() -> strand::Result<()> {
//!     let channel = Channel::rendezvous();
//!
//!     let sender = channel.clone();
//!     strand::spawn(async move {
//!         delay(Duration::from_millis(100)).await?;
//!         sender.send("hello").await
//!     });
//!
//!     println!("{}", channel.recv().await?);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`channel`]: typed FIFO channels between tasks
//! - [`task`]: spawning, join handles, scopes and cancellation checks
//! - [`time`]: delays, timeouts and instrumentation
//!
//! ## Logging
//!
//! Strand emits [`tracing`](https://docs.rs/tracing) events. Every task poll
//! runs inside a `task` span carrying the task id and name, so events
//! logged by application code are tagged with the task that produced them.

mod error;
mod runtime;

pub mod channel;
pub mod time;

pub use error::{Error, Result};
pub use runtime::Runtime;
pub use runtime::builder::{Clock, RuntimeBuilder};
pub use runtime::task;
pub use runtime::task::{JoinHandle, TaskId, TaskState, scope, spawn};
pub use runtime::yield_now::yield_now;

pub use strand_macros::{main, test};
