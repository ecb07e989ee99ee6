//! Retry policy for proxy-routed fetches

use std::time::Duration;

use crate::{ConfigError, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_SECS};

/// Bounded retry with a fixed delay between attempts.
///
/// `max_attempts` counts the first attempt, so `1` means no retries.
/// Fields are private; a policy can only be built through [`RetryPolicy::new`],
/// which keeps `max_attempts >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    /// Create a policy, rejecting `max_attempts == 0`
    pub fn new(max_attempts: u32, delay: Duration) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(Self { max_attempts, delay })
    }

    /// A single attempt, no delay
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether another attempt is allowed after `attempt` (1-indexed) failed
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        assert_eq!(
            RetryPolicy::new(0, Duration::ZERO),
            Err(ConfigError::ZeroAttempts)
        );
    }

    #[test]
    fn test_allows_retry_after() {
        let policy = RetryPolicy::new(3, Duration::ZERO).unwrap();
        assert!(policy.allows_retry_after(1));
        assert!(policy.allows_retry_after(2));
        assert!(!policy.allows_retry_after(3));

        assert!(!RetryPolicy::once().allows_retry_after(1));
    }
}
