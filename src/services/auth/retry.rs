//! Retry-with-backoff policy shared by every OIDC network operation.
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.initial_backoff.is_zero() {
            return Err(AuthError::invalid_config("retry initial backoff must be positive"));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(AuthError::invalid_config(
                "retry max backoff must not be smaller than the initial backoff",
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(AuthError::invalid_config("retry backoff factor must be >= 1.0"));
        }
        Ok(())
    }
}

/// Returned (through `From`) when the caller's token is cancelled mid-retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

impl From<Cancelled> for AuthError {
    fn from(err: Cancelled) -> Self {
        AuthError::external("operation cancelled").with_source(err)
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Wait before attempt `attempt` (the first attempt is 0 and never waits).
    ///
    /// delay = min(initial * factor * (attempt-1), max), so the first retry
    /// goes out immediately and later ones back off linearly.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let nanos = self.config.initial_backoff.as_nanos() as f64
            * self.config.backoff_factor
            * f64::from(attempt - 1);
        if !nanos.is_finite() || nanos >= self.config.max_backoff.as_nanos() as f64 {
            self.config.max_backoff
        } else {
            Duration::from_nanos(nanos.round() as u64)
        }
    }

    /// Runs `op` up to `max_retries + 1` times, retrying every failure.
    pub async fn run<T, E, F, Fut>(&self, cancel: &CancellationToken, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<Cancelled> + Display,
    {
        self.run_with(cancel, op, |_| true).await
    }

    /// Like [`RetryPolicy::run`], but failures for which `retryable` returns
    /// false are handed back immediately.
    pub async fn run_with<T, E, F, Fut, P>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
        retryable: P,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<Cancelled> + Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(E::from(Cancelled)),
                    _ = tokio::time::sleep(delay) => {}
                }
            } else if cancel.is_cancelled() {
                return Err(E::from(Cancelled));
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !retryable(&err) => return Err(err),
                Err(err) if attempt >= self.config.max_retries => {
                    warn!(attempts = attempt + 1, error = %err, "giving up after retries");
                    return Err(err);
                }
                Err(err) => {
                    warn!(attempt = attempt + 1, error = %err, "attempt failed, will retry");
                    attempt += 1;
                }
            }
        }
    }
}
