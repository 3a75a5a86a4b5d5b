//! Bounded retry with a fixed backoff.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Retry policy for one pipeline stage.
///
/// The operation runs at most `max_retries + 1` times. Only errors the
/// caller classifies as transient are retried; anything else is returned
/// after the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Run `op` until it succeeds, fails permanently or runs out of retries.
    ///
    /// # Returns
    /// The last result and the number of attempts made (at least 1)
    pub async fn run<T, E, F, Fut>(
        &self,
        stage: &str,
        is_transient: impl Fn(&E) -> bool,
        mut op: F,
    ) -> (Result<T, E>, u32)
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match op().await {
                Ok(value) => return (Ok(value), attempts),
                Err(err) if attempts <= self.max_retries && is_transient(&err) => {
                    warn!(
                        "{} attempt {} failed ({}), retrying in {:?}",
                        stage, attempts, err, self.backoff
                    );
                    if !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
                Err(err) => return (Err(err), attempts),
            }
        }
    }
}
