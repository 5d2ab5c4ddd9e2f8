//! Time utilities.
//!
//! Every function here reads the clock of the runtime driving the current
//! thread (see [`Clock`](crate::Clock)), so under a virtual clock programs
//! built on them run instantly and deterministically.
//!
//! It includes:
//! - [`delay`] for suspending the current task,
//! - [`with_timeout`] and [`with_timeout_or_none`] for bounding work,
//! - [`instrumented`] for measuring how long a future takes,
//! - [`now`] for reading the runtime clock.

mod instrumented;
mod sleep;
mod timeout;

use crate::runtime::context;

use std::time::Duration;

#[doc(inline)]
pub use instrumented::{Instrumented, instrumented};

#[doc(inline)]
pub use sleep::{Delay, delay};

#[doc(inline)]
pub use timeout::{Timeout, with_timeout, with_timeout_or_none};

/// Time elapsed on the clock of the current runtime.
///
/// # Panics
///
/// Panics if called outside of a running runtime.
pub fn now() -> Duration {
    context::runtime()
        .expect("time::now called outside of runtime")
        .now()
}
