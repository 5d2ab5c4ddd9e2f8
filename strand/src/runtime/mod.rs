//! Core runtime components.
//!
//! This module contains the single-threaded scheduler and the task tree it
//! drives:
//! - the task arena (a generational slab), run queue and timer queue,
//! - the thread-local context used by spawns and suspension points,
//! - task handles, structured scopes and cooperative yielding.
//!
//! Most users will interact with higher-level APIs built on top of
//! these components rather than using this module directly.

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod core;
pub(crate) mod slab;
pub(crate) mod timer;
pub(crate) mod yield_now;

pub mod task;

pub use self::core::Runtime;
