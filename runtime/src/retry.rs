//! Retry logic with backoff for handling transient failures.
//!
//! Used by the transport to redeliver an event whose handler failed with a
//! retryable error, and by the service to wait for its dependencies at startup.
//!
//! # Example
//!
//! ```rust
//! use parksync_runtime::retry::{RetryPolicy, retry_with_backoff};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(5)
//!     .initial_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(10))
//!     .multiplier(2.0)
//!     .build();
//!
//! let result = retry_with_backoff(&policy, || async {
//!     Ok::<_, String>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration.
///
/// # Default Values
///
/// Fixed one-second backoff with two retries (three attempts in total):
///
/// - `max_retries`: 2
/// - `initial_delay`: 1 second
/// - `max_delay`: 30 seconds
/// - `multiplier`: 1.0
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Growth factor applied per retry (1.0 means fixed backoff)
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
        }
    }

    /// Policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::builder().max_retries(0).build()
    }

    /// Calculate delay for a given retry number (0-based).
    ///
    /// `delay = initial_delay * multiplier^attempt`, capped at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);

        let delay = Duration::from_millis(delay_ms as u64);

        delay.min(self.max_delay)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<u32>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set delay before the first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set growth factor.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(2),
            initial_delay: self.initial_delay.unwrap_or(Duration::from_secs(1)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(30)),
            multiplier: self.multiplier.unwrap_or(1.0),
        }
    }
}

/// Final result of a retried operation together with how many times it ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempts<T, E> {
    /// Last result
    pub result: Result<T, E>,
    /// Number of invocations (at least 1)
    pub attempts: u32,
}

/// Retry an async operation until it succeeds or the policy is exhausted.
///
/// # Errors
///
/// Returns the last error if every attempt failed.
///
/// # Example
///
/// ```rust
/// use parksync_runtime::retry::{RetryPolicy, retry_with_backoff};
///
/// # async fn example() -> Result<(), String> {
/// let result = retry_with_backoff(&RetryPolicy::no_retry(), || async {
///     Ok::<_, String>(42)
/// }).await?;
///
/// assert_eq!(result, 42);
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_predicate(policy, operation, |_| true).await.result
}

/// Retry an async operation while `is_retryable` accepts its error.
///
/// A rejected error is returned immediately. Unlike [`retry_with_backoff`] the
/// attempt count is returned alongside the result.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Attempts<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut retry = 0;

    loop {
        let attempts = retry + 1;
        match operation().await {
            Ok(value) => {
                if retry > 0 {
                    tracing::info!(attempts, "Operation succeeded after retry");
                }
                return Attempts {
                    result: Ok(value),
                    attempts,
                };
            },
            Err(err) => {
                if !is_retryable(&err) {
                    tracing::debug!(error = %err, "Error is not retryable, failing immediately");
                    return Attempts {
                        result: Err(err),
                        attempts,
                    };
                }

                if retry >= policy.max_retries {
                    tracing::error!(attempts, error = %err, "Operation failed after max retries");
                    return Attempts {
                        result: Err(err),
                        attempts,
                    };
                }

                let delay = policy.delay_for_attempt(retry);
                tracing::warn!(
                    attempts,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Operation failed, retrying..."
                );

                sleep(delay).await;
                retry += 1;
            },
        }
    }
}
