//! Fixed-delay retry policies
//!
//! Every wait in the client is a fixed, uninterruptible sleep. Sleeps go
//! through [`Sleeper`] so the retry loops can be exercised without real time
//! passing.

use std::time::Duration;

/// Blocks the current thread for a fixed delay
pub trait Sleeper {
    /// Sleep for `duration`
    fn sleep(&self, duration: Duration);
}

/// Sleeper backed by [`std::thread::sleep`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Fixed delay between attempts, with an optional attempt cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after each failed attempt
    pub delay: Duration,
    /// Maximum attempts; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retry forever with a fixed delay
    #[must_use]
    pub const fn unbounded(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Retry at most `max_attempts` times with a fixed delay
    #[must_use]
    pub const fn bounded(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts),
        }
    }

    /// Whether another attempt is allowed after `attempts_made` attempts
    #[must_use]
    pub const fn allows(&self, attempts_made: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts_made < max,
            None => true,
        }
    }
}
