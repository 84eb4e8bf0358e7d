//! Delay between notification channel connection attempts

use std::time::Duration;

/// Delay shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every attempt
    Constant(Duration),
    /// `initial * 2^n`, never more than `max`
    Exponential { initial: Duration, max: Duration },
}

/// When to retry, and whether to ever give up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub backoff: Backoff,
    /// Consecutive failed attempts tolerated; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    pub fn constant(delay: Duration) -> Self {
        Self {
            backoff: Backoff::Constant(delay),
            max_attempts: None,
        }
    }

    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            backoff: Backoff::Exponential { initial, max },
            max_attempts: None,
        }
    }

    /// Give up after `attempts` consecutive failures
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Delay before retrying after `failures` consecutive failures
    /// (0 for the first retry)
    pub fn delay(&self, failures: u32) -> Duration {
        match self.backoff {
            Backoff::Constant(delay) => delay,
            Backoff::Exponential { initial, max } => initial
                .checked_mul(2u32.saturating_pow(failures))
                .unwrap_or(max)
                .min(max),
        }
    }

    /// Whether `failures` consecutive failures exhaust the policy
    pub fn exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::constant(Duration::from_secs(3))
    }
}
