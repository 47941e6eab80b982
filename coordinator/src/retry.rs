//! Bounded retry with exponential backoff for failed training rounds.

use std::time::Duration;

/// Retry policy for workers that report `training_error`.
///
/// The barrier itself never retries; the session re-dispatches `train` to
/// the failed subset between barrier rounds under this policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retry rounds after the initial attempt.
    pub max_attempts: u32,
    /// Delay before the first retry round.
    pub base_delay: Duration,
    /// Upper bound on the backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// The backoff delay before retry round `attempt` (1-based): doubles
    /// each round, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1 << exp);
        delay.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_round() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
        };

        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };

        assert_eq!(policy.backoff(4), Duration::from_secs(5));
        assert_eq!(policy.backoff(32), Duration::from_secs(5));
    }

    #[test]
    fn no_retry_has_zero_attempts() {
        assert_eq!(RetryPolicy::no_retry().max_attempts, 0);
    }
}
