//! Retry pacing for refused admissions.
//!
//! Delays double from the initial value up to the cap. Once the admission
//! timeout has passed no further delay is handed out.

use gantry_core::ExecutorConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Exponential back-off bounded by a deadline
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    deadline: Instant,
    attempts: u32,
}

impl Backoff {
    /// Back-off starting now
    #[must_use]
    pub fn new(initial: Duration, max: Duration, timeout: Duration) -> Self {
        Self {
            next: initial.max(Duration::from_millis(1)),
            max: max.max(initial),
            deadline: Instant::now() + timeout,
            attempts: 0,
        }
    }

    /// Back-off from executor settings
    #[must_use]
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_initial_ms),
            Duration::from_millis(config.backoff_max_ms),
            Duration::from_millis(config.admission_timeout_ms),
        )
    }

    /// Delay before the next attempt, or `None` once the deadline has passed.
    /// The last delay is shortened so it never sleeps past the deadline.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let now = Instant::now();
        if now >= self.deadline {
            return None;
        }
        let delay = self.next.min(self.deadline - now);
        self.next = (self.next * 2).min(self.max);
        self.attempts += 1;
        Some(delay)
    }

    /// Delays handed out so far
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }
}
