//! Retry and backoff engine.
//!
//! Pure logic computing the next state of a job after a failed execution
//! attempt. No storage access happens here: the store feeds the current
//! attempt counters in and applies the returned decision.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Ceiling on a computed backoff delay, in seconds.
///
/// Keeps the timestamp arithmetic total for adversarial bases; unreachable
/// within the retry budget for realistic configurations.
pub const MAX_BACKOFF_SECS: u64 = 86_400;

/// Retry configuration of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries before the job is moved to the DLQ.
    pub max_retries: u32,
    /// Base for the exponential backoff delay.
    pub backoff_base: u32,
}

impl RetryPolicy {
    /// Create a policy.
    pub fn new(max_retries: u32, backoff_base: u32) -> Self {
        Self {
            max_retries,
            backoff_base,
        }
    }
}

/// Outcome of a failed execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another attempt: the job becomes `failed` and claimable
    /// again once `next_retry_at` has passed.
    Retry {
        attempts: u32,
        next_retry_at: DateTime<Utc>,
    },
    /// The retry budget is exhausted: the job becomes `dead` (DLQ).
    Dead { attempts: u32 },
}

impl RetryDecision {
    /// The attempt counter the store should persist.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Retry { attempts, .. } | Self::Dead { attempts } => *attempts,
        }
    }
}

/// Compute the backoff delay for a given attempt number (1-indexed).
///
/// The delay is `backoff_base ^ attempt` seconds, saturating at
/// [`MAX_BACKOFF_SECS`].
pub fn backoff_delay(backoff_base: u32, attempt: u32) -> Duration {
    let secs = (backoff_base.max(1) as u64)
        .checked_pow(attempt)
        .unwrap_or(MAX_BACKOFF_SECS)
        .min(MAX_BACKOFF_SECS);
    Duration::seconds(secs as i64)
}

/// Evaluate a failed attempt against the job's retry policy.
///
/// `attempts` is the counter *before* this failure; the returned decision
/// carries the incremented counter. A job dies exactly when the failed
/// attempt would push the counter past `max_retries`, so a job gets
/// `max_retries + 1` attempts in total.
pub fn evaluate(attempts: u32, policy: &RetryPolicy, now: DateTime<Utc>) -> RetryDecision {
    let attempts = attempts + 1;

    if attempts > policy.max_retries {
        RetryDecision::Dead { attempts }
    } else {
        RetryDecision::Retry {
            attempts,
            next_retry_at: now + backoff_delay(policy.backoff_base, attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule_base_two() {
        let policy = RetryPolicy::new(3, 2);
        let now = Utc::now();

        // Attempt 1..=3 failures schedule retries 2s, 4s, 8s out.
        for (prior_attempts, delay_secs) in [(0, 2), (1, 4), (2, 8)] {
            match evaluate(prior_attempts, &policy, now) {
                RetryDecision::Retry {
                    attempts,
                    next_retry_at,
                } => {
                    assert_eq!(attempts, prior_attempts + 1);
                    assert_eq!(next_retry_at, now + Duration::seconds(delay_secs));
                }
                RetryDecision::Dead { .. } => panic!("retry budget not yet exhausted"),
            }
        }

        // The fourth failure exhausts the budget: no further scheduling.
        assert_eq!(evaluate(3, &policy, now), RetryDecision::Dead { attempts: 4 });
    }

    #[test]
    fn test_no_retries_dies_immediately() {
        let policy = RetryPolicy::new(0, 2);
        let now = Utc::now();
        assert_eq!(evaluate(0, &policy, now), RetryDecision::Dead { attempts: 1 });
    }

    #[test]
    fn test_base_one_is_constant_delay() {
        assert_eq!(backoff_delay(1, 1), Duration::seconds(1));
        assert_eq!(backoff_delay(1, 7), Duration::seconds(1));
    }

    #[test]
    fn test_delay_saturates() {
        assert_eq!(
            backoff_delay(10, 30),
            Duration::seconds(MAX_BACKOFF_SECS as i64)
        );
        // Zero base is clamped to one rather than collapsing the delay.
        assert_eq!(backoff_delay(0, 3), Duration::seconds(1));
    }

    #[test]
    fn test_decision_attempts_accessor() {
        let now = Utc::now();
        assert_eq!(evaluate(1, &RetryPolicy::new(5, 2), now).attempts(), 2);
        assert_eq!(evaluate(5, &RetryPolicy::new(5, 2), now).attempts(), 6);
    }
}
