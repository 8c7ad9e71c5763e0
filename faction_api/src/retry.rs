use std::time::Duration;

use crate::OutcomeKind;

/// Bounded retry with exponential backoff.
///
/// After failed attempt `n` (1-based) the client waits `base * multiplier^(n-1)`, capped at `max_delay`. Rate-limited
/// responses start from `rate_limit_delay` instead of `base_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. A value of 1 disables retries.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub rate_limit_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            rate_limit_delay: Duration::from_secs(5),
            multiplier: 2,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// The delay to wait after failed attempt number `attempt` that ended with `kind`.
    pub fn delay_for(&self, kind: OutcomeKind, attempt: u32) -> Duration {
        let base = match kind {
            OutcomeKind::RateLimited => self.rate_limit_delay,
            _ => self.base_delay,
        };
        let factor = self.multiplier.max(1).saturating_pow(attempt.saturating_sub(1));
        base.saturating_mul(factor).min(self.max_delay)
    }

    pub fn should_retry(&self, kind: OutcomeKind, attempt: u32) -> bool {
        kind.is_retryable() && attempt < self.max_attempts.max(1)
    }
}
