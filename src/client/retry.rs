//! Bounded exponential retry
//!
//! Wraps any fallible API call. Retry decisions are made by error
//! classification ([`Error::is_retryable`]), never by message text.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum total attempts (first call included)
    pub max_tries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt
    pub factor: u32,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: 7,
            base_delay: Duration::from_secs(1),
            factor: 5,
            max_delay: Duration::from_secs(600),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with a custom attempt budget
    pub fn new(max_tries: u32) -> Self {
        Self {
            max_tries,
            ..Self::default()
        }
    }

    /// Set the base delay
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the backoff factor
    #[must_use]
    pub fn with_factor(mut self, factor: u32) -> Self {
        self.factor = factor;
        self
    }

    /// Backoff delay after the given number of failed attempts (1-based)
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1);
        let multiplier = self.factor.saturating_pow(exponent);
        std::cmp::min(self.base_delay.saturating_mul(multiplier), self.max_delay)
    }

    /// Run an operation, retrying retryable failures up to the budget
    ///
    /// Non-retryable errors propagate immediately. When the budget runs
    /// out, the last error is returned wrapped in
    /// [`Error::RetriesExhausted`].
    pub async fn retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt >= self.max_tries => {
                    return Err(Error::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_tries = self.max_tries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient API failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
