//! Bounded retry with linear backoff

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::{Result, S3Error};
use crate::config::ClientConfig;

/// Retry policy: the k-th failure is retried after `k * backoff_unit` when
/// `k < max_retries` and the failure is not fatal.
///
/// Admission rejections and transient failures share the same schedule and
/// the same bound. `max_retries` of 0 or 1 means a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_unit: Duration) -> Self {
        Self {
            max_retries,
            backoff_unit,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.max_retries, config.retry_backoff())
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether the `failures`-th failure (1-indexed) gets another attempt
    pub fn should_retry(&self, failures: u32, error: &S3Error) -> bool {
        failures < self.max_retries && error.is_retryable()
    }

    /// Delay before retrying after the `failures`-th failure
    pub fn delay(&self, failures: u32) -> Duration {
        self.backoff_unit.saturating_mul(failures)
    }

    /// Run `attempt` until it succeeds, fails fatally or the bound is hit.
    /// `attempt` receives the 1-indexed attempt number.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut failures = 0;
        loop {
            let error = match attempt(failures + 1).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            failures += 1;

            if !self.should_retry(failures, &error) {
                if failures > 1 {
                    debug!(attempts = failures, error = %error, "Giving up on S3 request");
                }
                return Err(error);
            }

            let delay = self.delay(failures);
            debug!(
                attempt = failures,
                class = ?error.retry_class(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying S3 request"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(S3Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
