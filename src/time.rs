//! Time abstraction for the protocol engine, allowing deterministic clocks in tests
//! and in the simulator.

use std::fmt::Debug;
use std::time::Instant;

/// Source of "now" for every deferred transition the engine evaluates on a tick.
pub trait Clock: Send + Sync + Debug {
    /// Current `Instant`.
    fn now(&self) -> Instant;
}

/// Clock backed by `std::time::Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually driven clock for tests and simulation.
pub mod mock_clock {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// A clock whose time only moves when told to.
    #[derive(Debug)]
    pub struct MockClock {
        current_time: Mutex<Instant>,
    }

    impl MockClock {
        /// Creates a new `MockClock` starting at `start_time`.
        pub fn new(start_time: Instant) -> Self {
            Self {
                current_time: Mutex::new(start_time),
            }
        }

        /// Moves the clock forward by `duration`.
        pub fn advance(&self, duration: Duration) {
            let mut current = self
                .current_time
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *current += duration;
        }

        /// Jumps the clock to `new_time`.
        pub fn set_time(&self, new_time: Instant) {
            let mut current = self
                .current_time
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *current = new_time;
        }
    }

    impl Default for MockClock {
        fn default() -> Self {
            Self::new(Instant::now())
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Instant {
            *self
                .current_time
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }
}
