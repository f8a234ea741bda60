//! Retry utilities with exponential backoff for resilient API calls.

use std::time::Duration;
use tokio::time::sleep;

use crate::sources::SourceError;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first transient failure
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Random jitter added to each delay, drawn from `[0, jitter)`
    pub jitter: Duration,
    /// Delay after the first HTTP 429
    pub rate_limit_delay: Duration,
    /// Upper bound on rate-limit delays
    pub rate_limit_max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(20),
            jitter: Duration::from_millis(500),
            rate_limit_delay: Duration::from_secs(5),
            rate_limit_max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Same schedule without any waiting; used by tests and dry runs
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
            rate_limit_delay: Duration::ZERO,
            rate_limit_max_delay: Duration::ZERO,
        }
    }

    /// Backoff before retrying after the `attempt`-th failure (1-based), jitter excluded
    pub fn base_delay(&self, attempt: u32, transient: &TransientError) -> Duration {
        let (initial, cap) = match transient {
            TransientError::RateLimit => (self.rate_limit_delay, self.rate_limit_max_delay),
            _ => (self.initial_delay, self.max_delay),
        };
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        initial.saturating_mul(factor).min(cap)
    }

    /// Backoff with jitter applied, still bounded by the cap
    pub fn delay_for(&self, attempt: u32, transient: &TransientError) -> Duration {
        let cap = match transient {
            TransientError::RateLimit => self.rate_limit_max_delay,
            _ => self.max_delay,
        };
        let jitter = self.jitter.mul_f64(fastrand::f64());
        (self.base_delay(attempt, transient) + jitter).min(cap)
    }
}

/// Transient errors that should trigger a retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransientError {
    /// Connection failures and timeouts
    Network,
    /// HTTP 429
    RateLimit,
    /// HTTP 500, 502, 503 or 504
    ServerError(u16),
}

impl TransientError {
    /// Status codes worth retrying
    pub const RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

    /// Check if a SourceError represents a transient error
    pub fn from_source_error(err: &SourceError) -> Option<Self> {
        match err {
            SourceError::RateLimit => Some(TransientError::RateLimit),
            SourceError::Network(_) => Some(TransientError::Network),
            SourceError::Server(status) => Some(TransientError::ServerError(*status)),
            _ => None,
        }
    }
}

/// Execute an async operation with retry logic
///
/// Transient failures are retried up to `config.max_attempts` times in total;
/// any other error is returned immediately. When attempts run out the last
/// transient error is returned unchanged so callers can decide whether to
/// fall back to another endpoint.
pub async fn with_retry<T, F, Fut>(config: RetryConfig, operation: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SourceError>>,
{
    let mut attempts = 0;
    let mut operation = operation;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    tracing::info!(
                        "Operation succeeded on attempt {} after {} transient failures",
                        attempts,
                        attempts - 1
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                let Some(transient) = TransientError::from_source_error(&error) else {
                    return Err(error);
                };

                if attempts >= config.max_attempts {
                    tracing::warn!("Operation failed after {} attempts: {}", attempts, error);
                    return Err(error);
                }

                let delay = config.delay_for(attempts, &transient);
                tracing::debug!(
                    "Transient error on attempt {}/{}: {:?}, retrying in {:?}",
                    attempts,
                    config.max_attempts,
                    transient,
                    delay
                );
                sleep(delay).await;
            }
        }
    }
}

/// Retry schedule for the arXiv export API
pub fn arxiv_retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 6,
        initial_delay: Duration::from_millis(1500),
        max_delay: Duration::from_secs(20),
        jitter: Duration::from_millis(500),
        rate_limit_delay: Duration::from_secs(5),
        rate_limit_max_delay: Duration::from_secs(60),
    }
}

/// Retry schedule for the Crossref REST API
pub fn crossref_retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 4,
        initial_delay: Duration::from_millis(800),
        max_delay: Duration::from_secs(8),
        jitter: Duration::from_millis(300),
        rate_limit_delay: Duration::from_secs(2),
        rate_limit_max_delay: Duration::from_secs(30),
    }
}
