//! Circuit breaker for the relevance oracle.
//!
//! After `failure_threshold` consecutive failures the oracle is skipped and
//! callers fall back to lexical ranking. It has three states:
//!
//! - **Closed**: Normal operation, requests pass through
//! - **Open**: Oracle is failing, requests are immediately rejected
//! - **Half-Open**: Testing if the oracle has recovered
//!
//! # Usage
//!
//! ```rust
//! use citation_master::utils::{CircuitBreaker, CircuitState};
//!
//! let breaker = CircuitBreaker::new("openai", 3, std::time::Duration::from_secs(30));
//!
//! assert_eq!(breaker.state(), CircuitState::Closed);
//! ```

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Failing - requests are rejected
    Open,
    /// Testing recovery - a probe request is allowed
    HalfOpen,
}

impl TryFrom<u8> for CircuitState {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CircuitState::Closed),
            1 => Ok(CircuitState::Open),
            2 => Ok(CircuitState::HalfOpen),
            _ => Err(()),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: usize,

    /// Number of successes in half-open state to close the circuit
    pub success_threshold: usize,

    /// Duration to stay open before trying half-open
    pub open_duration: Duration,
}

/// Result of a circuit breaker operation
#[derive(Debug)]
pub enum CircuitResult<T, E> {
    /// Operation succeeded
    Success(T),
    /// Operation ran and failed
    Failure(E),
    /// Circuit is open, the operation was not run
    Rejected,
}

impl<T, E> CircuitResult<T, E> {
    /// Check if the operation was successful
    pub fn is_success(&self) -> bool {
        matches!(self, CircuitResult::Success(_))
    }

    /// Check if the result is a rejection due to open circuit
    pub fn is_rejected(&self) -> bool {
        matches!(self, CircuitResult::Rejected)
    }
}

/// Thread-safe circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,

    state: AtomicU8,

    /// Consecutive failures while closed
    failure_count: AtomicUsize,

    /// Consecutive successes while half-open
    success_count: AtomicUsize,

    /// Reference point for `opened_at_ms`
    epoch: Instant,

    /// Milliseconds after `epoch` when the circuit opened, plus one (0 = never)
    opened_at_ms: AtomicU64,

    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    ///
    /// - `name`: Identifier for this circuit (e.g., the oracle id)
    /// - `failure_threshold`: Consecutive failures before opening
    /// - `open_duration`: Time to stay open before half-open
    pub fn new(name: &str, failure_threshold: usize, open_duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_count: AtomicUsize::new(0),
            success_count: AtomicUsize::new(0),
            epoch: Instant::now(),
            opened_at_ms: AtomicU64::new(0),
            config: CircuitBreakerConfig {
                failure_threshold: failure_threshold.max(1),
                success_threshold: 1,
                open_duration,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state
    pub fn state(&self) -> CircuitState {
        let state = CircuitState::try_from(self.state.load(Ordering::SeqCst))
            .unwrap_or(CircuitState::Closed);

        if state == CircuitState::Open {
            if let Some(since) = self.open_elapsed() {
                if since >= self.config.open_duration {
                    return CircuitState::HalfOpen;
                }
            }
        }

        state
    }

    fn open_elapsed(&self) -> Option<Duration> {
        match self.opened_at_ms.load(Ordering::SeqCst) {
            0 => None,
            stamp => {
                let now = self.epoch.elapsed().as_millis() as u64 + 1;
                Some(Duration::from_millis(now.saturating_sub(stamp)))
            }
        }
    }

    fn open(&self) {
        self.state.store(CircuitState::Open as u8, Ordering::SeqCst);
        self.success_count.store(0, Ordering::SeqCst);
        let stamp = self.epoch.elapsed().as_millis() as u64 + 1;
        self.opened_at_ms.store(stamp, Ordering::SeqCst);
    }

    /// Record a success
    pub fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                let count = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= self.config.success_threshold {
                    self.reset();
                    tracing::info!(circuit = %self.name, "circuit closed (recovered)");
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failure
    pub fn record_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= self.config.failure_threshold {
                    self.open();
                    tracing::warn!(
                        circuit = %self.name,
                        failures = count,
                        "circuit opened, falling back to lexical ranking"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.open();
                tracing::warn!(circuit = %self.name, "circuit reopened (failure in half-open)");
            }
            CircuitState::Open => {}
        }
    }

    /// Check if a request should be allowed
    pub fn can_request(&self) -> bool {
        !matches!(self.state(), CircuitState::Open)
    }

    /// Execute an async operation with circuit breaker protection.
    ///
    /// The future is only polled when the circuit allows a request.
    pub async fn execute<F, T, E>(&self, operation: F) -> CircuitResult<T, E>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        if !self.can_request() {
            return CircuitResult::Rejected;
        }

        match operation.await {
            Ok(result) => {
                self.record_success();
                CircuitResult::Success(result)
            }
            Err(e) => {
                self.record_failure();
                CircuitResult::Failure(e)
            }
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        self.state.store(CircuitState::Closed as u8, Ordering::SeqCst);
        self.failure_count.store(0, Ordering::SeqCst);
        self.success_count.store(0, Ordering::SeqCst);
        self.opened_at_ms.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_closed_by_default() {
        let breaker = CircuitBreaker::new("test", 3, Duration::from_secs(60));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_request());
    }

    #[test]
    fn test_circuit_breaker_opens_after_failures() {
        let breaker = CircuitBreaker::new("test", 3, Duration::from_secs(60));

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_request());
    }

    #[test]
    fn test_circuit_breaker_success_resets() {
        let breaker = CircuitBreaker::new("test", 3, Duration::from_secs(60));

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.failure_count.load(Ordering::SeqCst), 2);

        breaker.record_success();
        assert_eq!(breaker.failure_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_circuit_breaker_half_open_after_cooldown() {
        let breaker = CircuitBreaker::new("test", 1, Duration::ZERO);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_circuit_breaker_execute_success() {
        let breaker = CircuitBreaker::new("test", 3, Duration::from_secs(60));

        let result = breaker.execute(async { Ok::<i32, &str>(42) }).await;
        assert!(matches!(result, CircuitResult::Success(42)));
    }

    #[tokio::test]
    async fn test_circuit_breaker_execute_rejected() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_secs(60));

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        let result = breaker.execute(async { Ok::<i32, &str>(42) }).await;
        assert!(result.is_rejected());
    }
}
