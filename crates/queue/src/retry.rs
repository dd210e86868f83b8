use std::time::Duration;

/// Bounded retry with exponential backoff for queue job handlers.
///
/// Jobs that exhaust the budget are dead-lettered rather than dropped.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per job, including the first one. Minimum 1.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles per subsequent attempt.
    pub base_delay: Duration,
    /// Upper bound on any single backoff.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Backoff to sleep after attempt number `attempt` (1-based) failed,
    /// or `None` when the budget is exhausted and the job should be
    /// dead-lettered.
    pub fn backoff_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        Some(delay.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}
