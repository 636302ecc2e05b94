//! Retry policy for delivery attempts.
//!
//! A pure decision function over already-classified failures: given which
//! attempt just failed and how, it answers "retry after this delay" or
//! "give up". It performs no I/O and holds no mutable state, so it can be
//! tested exhaustively on its own.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

/// How the delay between retries grows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Every retry waits the same `retry_delay`.
    #[default]
    Flat,
    /// Retry `n` waits `retry_delay * 2^(n - 1)`, capped at `max_retry_delay`.
    Exponential,
}

/// What the dispatcher should do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another attempt after the delay.
    Retry(Duration),
    /// Terminal; stop trying.
    Fail,
}

/// Retry policy configuration for delivery attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    ///
    /// A message is attempted at most `max_retries + 1` times in total.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Base delay between attempts (in seconds).
    ///
    /// Default: 300 seconds (5 minutes)
    #[serde(default = "defaults::retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Delay growth strategy.
    ///
    /// Default: flat
    #[serde(default)]
    pub backoff: Backoff,

    /// Cap on the delay when exponential backoff is configured (in seconds).
    ///
    /// Default: 86400 seconds (24 hours)
    #[serde(default = "defaults::max_retry_delay_secs")]
    pub max_retry_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            retry_delay_secs: defaults::retry_delay_secs(),
            backoff: Backoff::default(),
            max_retry_delay_secs: defaults::max_retry_delay_secs(),
        }
    }
}

impl RetryPolicy {
    /// Decide the next state after attempt number `attempt` (1-indexed, the
    /// attempt that just failed) ended with `error`.
    ///
    /// A permanent failure is terminal immediately, whatever the remaining
    /// budget; retrying it cannot succeed and only wastes delivery quota.
    #[must_use]
    pub fn decide(&self, attempt: u32, error: &DeliveryError) -> RetryDecision {
        if error.is_permanent() {
            return RetryDecision::Fail;
        }

        if attempt > self.max_retries {
            RetryDecision::Fail
        } else {
            RetryDecision::Retry(self.delay_for(attempt))
        }
    }

    /// The delay scheduled after attempt number `attempt` fails transiently.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = Duration::from_secs(self.retry_delay_secs);

        match self.backoff {
            Backoff::Flat => base,
            Backoff::Exponential => {
                let cap = Duration::from_secs(self.max_retry_delay_secs);
                let exponent = attempt.saturating_sub(1).min(31);
                base.saturating_mul(1_u32 << exponent).min(cap)
            }
        }
    }
}

mod defaults {
    pub const fn max_retries() -> u32 {
        3
    }

    pub const fn retry_delay_secs() -> u64 {
        300 // 5 minutes
    }

    pub const fn max_retry_delay_secs() -> u64 {
        86400 // 24 hours
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{PermanentError, TemporaryError};

    use super::*;

    fn transient() -> DeliveryError {
        DeliveryError::Temporary(TemporaryError::ServerBusy("451 busy".to_owned()))
    }

    fn permanent() -> DeliveryError {
        DeliveryError::Permanent(PermanentError::InvalidRecipient("550 unknown".to_owned()))
    }

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.retry_delay_secs, 300);
        assert_eq!(policy.backoff, Backoff::Flat);
        assert_eq!(policy.max_retry_delay_secs, 86400);
    }

    #[test]
    fn test_flat_schedule_until_budget_runs_out() {
        let policy = RetryPolicy {
            max_retries: 2,
            retry_delay_secs: 5,
            ..RetryPolicy::default()
        };

        // Two retries of 5 seconds each, then terminal on the third attempt
        assert_eq!(
            policy.decide(1, &transient()),
            RetryDecision::Retry(Duration::from_secs(5))
        );
        assert_eq!(
            policy.decide(2, &transient()),
            RetryDecision::Retry(Duration::from_secs(5))
        );
        assert_eq!(policy.decide(3, &transient()), RetryDecision::Fail);
    }

    #[test]
    fn test_permanent_failure_short_circuits() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.decide(1, &permanent()), RetryDecision::Fail);
        assert_eq!(policy.decide(2, &permanent()), RetryDecision::Fail);
    }

    #[test]
    fn test_zero_retries_fails_on_first_attempt() {
        let policy = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };

        assert_eq!(policy.decide(1, &transient()), RetryDecision::Fail);
    }

    #[test]
    fn test_exponential_delay_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_retries: 10,
            retry_delay_secs: 60,
            backoff: Backoff::Exponential,
            max_retry_delay_secs: 86400,
        };

        assert_eq!(policy.delay_for(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for(2), Duration::from_secs(120));
        assert_eq!(policy.delay_for(3), Duration::from_secs(240));
        assert_eq!(policy.delay_for(4), Duration::from_secs(480));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy {
            max_retries: 30,
            retry_delay_secs: 3600,
            backoff: Backoff::Exponential,
            max_retry_delay_secs: 86400,
        };

        assert_eq!(policy.delay_for(5), Duration::from_secs(57600));
        assert_eq!(policy.delay_for(6), Duration::from_secs(86400));
        assert_eq!(policy.delay_for(20), Duration::from_secs(86400));
    }
}
