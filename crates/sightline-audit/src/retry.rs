//! Bounded retry policy for pipeline attempts.

use std::time::Duration;

use crate::error::PipelineError;

/// Fixed-count, fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
    /// Whether an audit timeout is worth another attempt.
    pub retry_on_timeout: bool,
}

impl Default for RetryPolicy {
    /// One attempt plus three retries, thirty seconds apart.
    fn default() -> Self {
        Self {
            max_attempts: 4,
            delay: Duration::from_secs(30),
            retry_on_timeout: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            retry_on_timeout: true,
        }
    }

    /// Only ever run once.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_retry_on_timeout(mut self, retry: bool) -> Self {
        self.retry_on_timeout = retry;
        self
    }

    /// Decide whether `error`, raised during attempt number `attempt`
    /// (1-based), should be followed by another attempt.
    pub fn should_retry(&self, attempt: u32, error: &PipelineError) -> bool {
        if attempt >= self.max_attempts || !error.is_retryable() {
            return false;
        }
        match error.stage_error() {
            Some(stage) if stage.is_timeout() => self.retry_on_timeout,
            _ => true,
        }
    }
}
