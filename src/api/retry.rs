//! Exponential backoff schedule and the sleeping seam

use std::time::{Duration, Instant};

/// Default cap for a single backoff delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Retry schedule shared by the API client and notification channels.
///
/// `retries` is the total number of attempts, so `retries = 3` means one
/// initial try plus two retries. Values below 1 are raised to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, base_delay: Duration) -> Self {
        Self {
            retries: retries.max(1),
            base_delay,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (counted from 1):
    /// `base * 2^(attempt-1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Abstraction over blocking sleep and the clock it advances,
/// enabling deterministic tests
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);

    /// Current monotonic time, as seen by this sleeper
    fn now(&self) -> Instant;
}

/// Sleeps the current thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Recording sleeper for tests.
/// Available for use in external test crates
#[allow(dead_code)]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records requested durations without sleeping. Its clock starts at
    /// construction and only advances by the recorded sleeps.
    #[derive(Clone)]
    pub struct RecordingSleeper {
        origin: Instant,
        slept: Arc<Mutex<Vec<Duration>>>,
    }

    impl Default for RecordingSleeper {
        fn default() -> Self {
            Self {
                origin: Instant::now(),
                slept: Arc::default(),
            }
        }
    }

    impl RecordingSleeper {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every requested sleep, in order
        pub fn durations(&self) -> Vec<Duration> {
            self.slept.lock().unwrap().clone()
        }

        /// Sum of all requested sleeps
        pub fn total(&self) -> Duration {
            self.slept.lock().unwrap().iter().sum()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }

        fn now(&self) -> Instant {
            self.origin + self.total()
        }
    }
}
