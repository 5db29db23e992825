//! # Retry policy for failed attempts.
//!
//! [`RetryPolicy`] answers two questions after an attempt fails:
//! - may it be retried? ([`RetryPolicy::is_retryable`], bounded by `max_retries`)
//! - how long until it re-enters the queue? ([`RetryPolicy::backoff_for`])
//!
//! Attempts are 1-based: the first execution is attempt 1. With
//! `max_retries = 3` an item runs at most 4 times.

use std::time::Duration;

use crate::error::GovernorError;
use crate::policies::BackoffPolicy;

/// Outcome of [`RetryPolicy::decide`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue after `delay`.
    Retry { delay: Duration },
    /// Resolve the caller with the error.
    GiveUp,
}

/// Bounded retry with exponential backoff.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed beyond the initial attempt.
    pub max_retries: u32,
    /// Delay growth between retries.
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryPolicy {
    /// Whether the error class is retryable at all.
    #[inline]
    pub fn is_retryable(&self, err: &GovernorError) -> bool {
        err.is_retryable()
    }

    /// Delay after the failed 1-based `attempt`.
    #[inline]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff.next(attempt.saturating_sub(1))
    }

    /// Decides what happens after `attempt` failed with `err`.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use reqvisor::{GovernorError, RetryDecision, RetryPolicy};
    ///
    /// let policy = RetryPolicy::default();
    /// let err = GovernorError::Timeout { timeout: Duration::from_secs(30) };
    ///
    /// assert_eq!(policy.decide(1, &err), RetryDecision::Retry { delay: Duration::from_secs(1) });
    /// assert_eq!(policy.decide(4, &err), RetryDecision::GiveUp);
    /// ```
    pub fn decide(&self, attempt: u32, err: &GovernorError) -> RetryDecision {
        if self.is_retryable(err) && attempt <= self.max_retries {
            RetryDecision::Retry {
                delay: self.backoff_for(attempt),
            }
        } else {
            RetryDecision::GiveUp
        }
    }
}
