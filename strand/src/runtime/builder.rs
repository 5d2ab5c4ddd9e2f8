use super::Runtime;

/// Time source used by the runtime.
///
/// Both clocks measure time as an offset from the moment the runtime was
/// built. They only differ in what happens when every task is waiting for a
/// timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    /// Wall-clock time. The scheduler sleeps the thread until the next
    /// timer is due.
    #[default]
    System,

    /// Simulated time. The scheduler jumps straight to the next deadline,
    /// so timer-heavy programs run instantly and deterministically.
    Virtual,
}

/// Builder for configuring and creating a runtime.
///
/// # Examples
///
/// ```rust
/// use strand::{Clock, RuntimeBuilder};
///
/// let runtime = RuntimeBuilder::new()
///     .clock(Clock::Virtual)
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuntimeBuilder {
    /// Time source for `delay` and timeouts.
    clock: Clock,
}

impl RuntimeBuilder {
    /// Creates a builder with the system clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the time source.
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the runtime with the configured options.
    pub fn build(self) -> Runtime {
        Runtime::new(self.clock)
    }
}
