//! Retry strategy with exponential backoff for transient backend errors.
//!
//! Attempts are always bounded: once the budget is spent the last transient
//! failure is reported as `StorageUnavailable` instead of being retried forever.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try.
    pub max_retries: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay (cap for exponential growth).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl RetryConfig {
    /// Create a new retry configuration.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Configuration that never retries.
    pub fn none() -> Self {
        Self::new(0)
    }

    /// Set initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate delay for a given attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);

        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            // +/- 25%
            let jitter_factor = 0.75 + (rand::random::<f64>() * 0.5);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Retry executor for running backend calls with retry logic.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute `operation`, retrying while it fails with a retryable error.
    ///
    /// `what` names the operation in logs and in the `StorageUnavailable`
    /// message; it must not contain locators or other internal detail.
    ///
    /// # Errors
    /// - Non-retryable errors are returned unchanged after the first failure
    /// - `StorageUnavailable` once `max_retries + 1` attempts have failed
    pub async fn execute<F, Fut, T>(&self, what: &'static str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(operation = what, retries = attempt, "Operation succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if !err.is_retryable() {
                        return Err(err);
                    }

                    attempt += 1;
                    if attempt > self.config.max_retries {
                        warn!(
                            operation = what,
                            attempts = attempt,
                            error = %err,
                            "Retry budget exhausted"
                        );
                        return Err(Error::StorageUnavailable(what.to_string()));
                    }

                    let delay = self.config.delay_for_attempt(attempt - 1);
                    warn!(
                        operation = what,
                        attempt,
                        error = %err,
                        "Attempt failed, retrying in {:?}",
                        delay
                    );

                    sleep(delay).await;
                }
            }
        }
    }

    /// Get the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}
