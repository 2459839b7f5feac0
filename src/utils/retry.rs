//! Retry utilities with exponential backoff for oracle calls.

use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};

use crate::oracle::OracleError;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of attempts (first call included)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum total time to spend on retries (including delays)
    pub max_total_time: Duration,
    /// Time allowed for a single attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            max_total_time: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    /// Set the number of retries after the first attempt
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_attempts = retries + 1;
        self
    }

    /// Set the overall time budget
    pub fn max_total_time(mut self, budget: Duration) -> Self {
        self.max_total_time = budget;
        self
    }

    /// Set the time allowed for a single attempt
    pub fn attempt_timeout(mut self, limit: Duration) -> Self {
        self.attempt_timeout = limit;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return self.initial_delay;
        }
        let exp = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powf(attempt as f64 - 1.0);
        Duration::from_secs_f64(exp.min(self.max_delay.as_secs_f64()))
    }
}

/// Transient errors that should trigger a retry
#[derive(Debug, Clone, PartialEq)]
pub enum TransientError {
    /// Network connectivity issues
    Network,
    /// Rate limit exceeded (with optional retry-after seconds)
    RateLimit(Option<u64>),
    /// Server error (5xx)
    ServerError,
    /// Request timeout
    Timeout,
}

impl TransientError {
    /// Check if an [`OracleError`] represents a transient error
    pub fn from_oracle_error(err: &OracleError) -> Option<Self> {
        match err {
            OracleError::RateLimit(after) => Some(TransientError::RateLimit(*after)),
            OracleError::Network(_) => Some(TransientError::Network),
            OracleError::Timeout(_) => Some(TransientError::Timeout),
            OracleError::Api { status, .. } if *status >= 500 => Some(TransientError::ServerError),
            _ => None,
        }
    }

    /// Get the recommended delay for this error
    pub fn recommended_delay(&self) -> Duration {
        match self {
            TransientError::RateLimit(Some(seconds)) => Duration::from_secs(*seconds),
            TransientError::RateLimit(None) => Duration::from_secs(1),
            TransientError::ServerError => Duration::from_millis(250),
            TransientError::Network => Duration::from_millis(200),
            TransientError::Timeout => Duration::from_millis(100),
        }
    }
}

/// Execute an async operation with retry logic.
///
/// Permanent errors are returned immediately. Transient errors are retried
/// with exponential backoff until `max_attempts` or `max_total_time` is hit.
pub async fn with_retry<T, F, Fut>(config: RetryConfig, operation: F) -> Result<T, OracleError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, OracleError>>,
{
    let mut attempts = 0;
    let started = Instant::now();
    let mut operation = operation;

    loop {
        attempts += 1;

        let error = match timeout(config.attempt_timeout, operation()).await {
            Ok(Ok(result)) => {
                if attempts > 1 {
                    tracing::debug!(attempts, "oracle call succeeded after retry");
                }
                return Ok(result);
            }
            Ok(Err(error)) => error,
            Err(_) => OracleError::Timeout(config.attempt_timeout),
        };

        let Some(transient) = TransientError::from_oracle_error(&error) else {
            return Err(error);
        };

        let delay = std::cmp::max(config.backoff(attempts), transient.recommended_delay());
        let total_elapsed = started.elapsed() + delay;

        if attempts >= config.max_attempts || total_elapsed >= config.max_total_time {
            tracing::warn!(
                attempts,
                ?total_elapsed,
                "oracle call failed after retries: {}",
                error
            );
            return Err(error);
        }

        tracing::debug!(attempt = attempts, ?transient, ?delay, "transient oracle error, retrying");
        sleep(delay).await;
    }
}

/// Retry configuration for oracle calls: each attempt gets `attempt_timeout`
/// and all attempts together stay within `deadline`
pub fn oracle_retry_config(max_retries: u32, attempt_timeout: Duration, deadline: Duration) -> RetryConfig {
    RetryConfig::default()
        .max_retries(max_retries)
        .attempt_timeout(attempt_timeout)
        .max_total_time(deadline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            max_total_time: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_retry_success_first_try() {
        let call_count = Rc::new(RefCell::new(0));

        let result = {
            let call_count = call_count.clone();
            with_retry(RetryConfig::default(), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Ok("success")
                }
            })
        }
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(*call_count.borrow(), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let call_count = Rc::new(RefCell::new(0));

        let result = {
            let call_count = call_count.clone();
            with_retry(fast_config(4), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    let count = *call_count.borrow();
                    if count < 3 {
                        Err(OracleError::Network("temporary error".to_string()))
                    } else {
                        Ok("success")
                    }
                }
            })
        }
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(*call_count.borrow(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let call_count = Rc::new(RefCell::new(0));

        let result: Result<&str, OracleError> = {
            let call_count = call_count.clone();
            with_retry(fast_config(2), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Err(OracleError::Network("down".to_string()))
                }
            })
        }
        .await;

        assert!(matches!(result, Err(OracleError::Network(_))));
        assert_eq!(*call_count.borrow(), 2);
    }

    #[tokio::test]
    async fn test_retry_returns_permanent_error() {
        let call_count = Rc::new(RefCell::new(0));

        let result: Result<&str, OracleError> = {
            let call_count = call_count.clone();
            with_retry(fast_config(5), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Err(OracleError::InvalidResponse("not json".to_string()))
                }
            })
        }
        .await;

        assert!(matches!(result, Err(OracleError::InvalidResponse(_))));
        assert_eq!(*call_count.borrow(), 1);
    }

    #[tokio::test]
    async fn test_slow_attempt_is_retried_within_budget() {
        let call_count = Rc::new(RefCell::new(0));
        let config = RetryConfig {
            attempt_timeout: Duration::from_millis(20),
            ..fast_config(3)
        };

        let result = {
            let call_count = call_count.clone();
            with_retry(config, move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    if *call_count.borrow() == 1 {
                        sleep(Duration::from_millis(200)).await;
                    }
                    Ok("second attempt")
                }
            })
        }
        .await;

        assert_eq!(result.unwrap(), "second attempt");
        assert_eq!(*call_count.borrow(), 2);
    }

    #[test]
    fn test_transient_error_detection() {
        assert!(TransientError::from_oracle_error(&OracleError::RateLimit(None)).is_some());
        assert!(
            TransientError::from_oracle_error(&OracleError::Network("refused".to_string()))
                .is_some()
        );
        let server = OracleError::Api {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert_eq!(
            TransientError::from_oracle_error(&server),
            Some(TransientError::ServerError)
        );
        let client = OracleError::Api {
            status: 401,
            message: "bad key".to_string(),
        };
        assert!(TransientError::from_oracle_error(&client).is_none());
    }

    #[test]
    fn test_recommended_delay() {
        assert_eq!(
            TransientError::RateLimit(Some(3)).recommended_delay(),
            Duration::from_secs(3)
        );
        assert_eq!(
            TransientError::Network.recommended_delay(),
            Duration::from_millis(200)
        );
    }
}
