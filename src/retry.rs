//! Bounded retry with linear backoff.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};

use crate::error::PriceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_ATTEMPTS: u32 = 2;
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn single_attempt() -> Self {
        Self::new(1, Self::DEFAULT_BASE_DELAY)
    }

    /// Wait after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ATTEMPTS, Self::DEFAULT_BASE_DELAY)
    }
}

/// Runs `operation` until it succeeds or `policy.max_attempts` is reached,
/// returning the last error in the latter case.
pub async fn retry<T, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, PriceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PriceError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt >= policy.max_attempts => {
                debug!("{}: giving up after {} attempt(s): {}", label, attempt, error);
                return Err(error);
            }
            Err(error) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "{}: attempt {}/{} failed, retrying in {:?}: {}",
                    label, attempt, policy.max_attempts, delay, error
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Like [`retry`], but a final failure is reported as `None`.
pub async fn with_retry<T, F, Fut>(label: &str, policy: &RetryPolicy, operation: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PriceError>>,
{
    retry(label, policy, operation).await.ok()
}
