/// Linear backoff schedule for reconnect loops
///
/// Attempt `n` (1-based) waits `n × base`. Once `max_attempts` is exceeded the
/// schedule is exhausted and callers stop retrying on their own.
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    /// Delay unit multiplied by the attempt number
    pub base: Duration,
    /// Highest attempt number that still gets a delay
    pub max_attempts: u32,
}

impl LinearBackoff {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self { base, max_attempts }
    }

    /// Delay before attempt `attempt`, or `None` when the schedule is exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.base.saturating_mul(attempt))
    }

    pub fn is_exhausted(&self, attempts_made: u32) -> bool {
        attempts_made >= self.max_attempts
    }
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(3),
            max_attempts: 5,
        }
    }
}
