//! Relevance oracle plugins.
//!
//! A [`RelevanceOracle`] scores how well a passage supports a claim and can
//! optionally judge whether an ambiguous sentence needs a citation at all.
//! The oracle is an external, fallible, rate-limited service: every call made
//! by the engine goes through a [`GuardedOracle`], which applies a deadline and
//! a circuit breaker and reports failures as an [`OracleOutcome`] instead of
//! an error, so callers can degrade to lexical ranking.

mod mock;
mod openai;

pub use mock::MockOracle;
pub use openai::OpenAiOracle;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::OracleConfig;
use crate::models::ClaimKind;
use crate::utils::{CircuitBreaker, CircuitResult};

bitflags::bitflags! {
    /// Capabilities that an oracle can support
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OracleCapabilities: u32 {
        const SCORE = 1 << 0;
        const JUDGE_CLAIM = 1 << 1;
    }
}

fn unit_interval(name: &str, value: f64) -> Result<f64, OracleError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(OracleError::InvalidResponse(format!(
            "{} {} outside [0, 1]",
            name, value
        )))
    }
}

/// A relevance judgement for one (claim, passage) pair
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct OracleScore {
    relevance: f64,
    confidence: f64,
}

impl OracleScore {
    /// Validate raw values; NaN and out-of-range values are rejected, never clamped
    pub fn new(relevance: f64, confidence: f64) -> Result<Self, OracleError> {
        Ok(Self {
            relevance: unit_interval("relevance", relevance)?,
            confidence: unit_interval("confidence", confidence)?,
        })
    }

    pub fn relevance(&self) -> f64 {
        self.relevance
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}

/// The oracle's verdict on whether a sentence needs a citation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClaimJudgement {
    probability: f64,
    pub kind: Option<ClaimKind>,
}

impl ClaimJudgement {
    pub fn new(probability: f64, kind: Option<ClaimKind>) -> Result<Self, OracleError> {
        Ok(Self {
            probability: unit_interval("needs_citation", probability)?,
            kind,
        })
    }

    /// Probability that the sentence needs support
    pub fn needs_citation(&self) -> f64 {
        self.probability
    }
}

/// The RelevanceOracle trait defines the interface for all relevance scorers.
#[async_trait]
pub trait RelevanceOracle: Send + Sync + std::fmt::Debug {
    /// Unique identifier (used in logs and the circuit breaker)
    fn id(&self) -> &str;

    /// Describe the capabilities of this oracle
    fn capabilities(&self) -> OracleCapabilities {
        OracleCapabilities::SCORE
    }

    /// Whether this oracle can judge ambiguous claims
    fn supports_claim_judgement(&self) -> bool {
        self.capabilities().contains(OracleCapabilities::JUDGE_CLAIM)
    }

    /// Wait until the oracle's request quota allows another call.
    ///
    /// [`GuardedOracle`] awaits this before starting the call deadline, so
    /// queueing for a permit never counts as oracle latency. `score` and
    /// `judge_claim` assume the first attempt already holds a permit.
    async fn ready(&self) {}

    /// Score how well `passage` supports `claim`
    async fn score(&self, claim: &str, passage: &str) -> Result<OracleScore, OracleError>;

    /// Judge whether `sentence` is a claim that needs a citation
    async fn judge_claim(&self, _sentence: &str) -> Result<ClaimJudgement, OracleError> {
        Err(OracleError::NotImplemented)
    }
}

/// Result of a guarded oracle call
#[derive(Debug, Clone, PartialEq)]
pub enum OracleOutcome<T> {
    /// The oracle answered in time
    Scored(T),
    /// The deadline expired
    TimedOut,
    /// The oracle failed, or the circuit is open
    Failed(String),
}

impl<T> OracleOutcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            OracleOutcome::Scored(v) => Some(v),
            _ => None,
        }
    }
}

/// Errors that can occur when calling an oracle
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// The requested operation is not implemented for this oracle
    #[error("Operation not implemented for this oracle")]
    NotImplemented,

    /// Oracle is disabled or not configured
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    /// The call exceeded its deadline
    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),

    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limit exceeded (with optional retry-after seconds)
    #[error("Rate limit exceeded")]
    RateLimit(Option<u64>),

    /// Non-success HTTP status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response could not be interpreted
    #[error("Invalid oracle response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OracleError::Timeout(Duration::ZERO)
        } else {
            OracleError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for OracleError {
    fn from(err: serde_json::Error) -> Self {
        OracleError::InvalidResponse(format!("JSON: {}", err))
    }
}

/// An oracle wrapped with a per-call deadline and a circuit breaker.
#[derive(Debug, Clone)]
pub struct GuardedOracle {
    inner: Arc<dyn RelevanceOracle>,
    breaker: Arc<CircuitBreaker>,
    deadline: Duration,
}

impl GuardedOracle {
    pub fn new(inner: Arc<dyn RelevanceOracle>, deadline: Duration, failure_threshold: usize) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            inner.id(),
            failure_threshold,
            Duration::from_secs(30),
        ));
        Self {
            inner,
            breaker,
            deadline,
        }
    }

    pub fn id(&self) -> &str {
        self.inner.id()
    }

    /// Whether the breaker currently lets calls through
    pub fn is_available(&self) -> bool {
        self.breaker.can_request()
    }

    pub fn supports_claim_judgement(&self) -> bool {
        self.inner.supports_claim_judgement()
    }

    /// Score a (claim, passage) pair within the deadline
    pub async fn score(&self, claim: &str, passage: &str) -> OracleOutcome<OracleScore> {
        self.guard(self.inner.score(claim, passage)).await
    }

    /// Judge a sentence within the deadline
    pub async fn judge_claim(&self, sentence: &str) -> OracleOutcome<ClaimJudgement> {
        if !self.supports_claim_judgement() {
            return OracleOutcome::Failed(OracleError::NotImplemented.to_string());
        }
        self.guard(self.inner.judge_claim(sentence)).await
    }

    async fn guard<T, F>(&self, call: F) -> OracleOutcome<T>
    where
        F: std::future::Future<Output = Result<T, OracleError>>,
    {
        if !self.is_available() {
            return OracleOutcome::Failed(format!("circuit open for {}", self.id()));
        }
        self.inner.ready().await;

        let deadline = self.deadline;
        let timed = async move {
            match tokio::time::timeout(deadline, call).await {
                Ok(result) => result,
                Err(_) => Err(OracleError::Timeout(deadline)),
            }
        };

        match self.breaker.execute(timed).await {
            CircuitResult::Success(value) => OracleOutcome::Scored(value),
            CircuitResult::Failure(OracleError::Timeout(_)) => {
                tracing::debug!(oracle = %self.id(), ?deadline, "oracle call timed out");
                OracleOutcome::TimedOut
            }
            CircuitResult::Failure(err) => {
                tracing::debug!(oracle = %self.id(), error = %err, "oracle call failed");
                OracleOutcome::Failed(err.to_string())
            }
            CircuitResult::Rejected => OracleOutcome::Failed(format!("circuit open for {}", self.id())),
        }
    }
}

/// Build the configured oracle.
///
/// Returns `Ok(None)` when the oracle is disabled or no API key is available;
/// the engine then runs in lexical-only (degraded) mode.
pub fn from_config(config: &OracleConfig) -> Result<Option<GuardedOracle>, OracleError> {
    if !config.enabled {
        tracing::info!("relevance oracle disabled by configuration");
        return Ok(None);
    }
    let Some(api_key) = config.resolved_api_key() else {
        tracing::warn!("no oracle API key configured; using lexical ranking only");
        return Ok(None);
    };

    let oracle = OpenAiOracle::new(config, api_key)?;
    Ok(Some(GuardedOracle::new(
        Arc::new(oracle),
        config.call_deadline(),
        config.failure_threshold,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_capabilities() {
        let caps = OracleCapabilities::SCORE | OracleCapabilities::JUDGE_CLAIM;
        assert!(caps.contains(OracleCapabilities::SCORE));
        assert!(!OracleCapabilities::SCORE.contains(OracleCapabilities::JUDGE_CLAIM));
    }

    #[test]
    fn test_score_validation() {
        let score = OracleScore::new(0.5, 0.9).unwrap();
        assert_eq!(score.relevance(), 0.5);
        assert_eq!(score.confidence(), 0.9);
        assert!(OracleScore::new(1.5, 0.5).is_err());
        assert!(OracleScore::new(0.5, -0.1).is_err());
        assert!(OracleScore::new(f64::NAN, 1.0).is_err());
        assert!(ClaimJudgement::new(2.0, None).is_err());
    }

    #[tokio::test]
    async fn test_guarded_oracle_times_out() {
        let mock = Arc::new(MockOracle::new().with_delay(Duration::from_millis(200)));
        let guarded = GuardedOracle::new(mock, Duration::from_millis(10), 3);
        assert_eq!(guarded.score("claim", "passage").await, OracleOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_guarded_oracle_opens_breaker() {
        let mock = Arc::new(MockOracle::new().failing());
        let guarded = GuardedOracle::new(mock.clone(), Duration::from_secs(1), 2);

        assert!(matches!(guarded.score("a", "b").await, OracleOutcome::Failed(_)));
        assert!(matches!(guarded.score("a", "b").await, OracleOutcome::Failed(_)));
        assert!(!guarded.is_available());

        // Rejected calls never reach the oracle
        assert!(matches!(guarded.score("a", "b").await, OracleOutcome::Failed(_)));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_quota_wait_is_outside_the_deadline() {
        let mock = Arc::new(MockOracle::new().with_default_score(0.9).with_rate_limit(2));
        let guarded = GuardedOracle::new(mock.clone(), Duration::from_millis(300), 3);

        let outcomes = futures_util::future::join_all((0..6).map(|_| guarded.score("a", "b"))).await;
        assert!(outcomes.iter().all(|o| matches!(o, OracleOutcome::Scored(_))));
        assert!(guarded.is_available());
        assert_eq!(mock.call_count(), 6);
    }

    #[test]
    fn test_disabled_config_yields_none() {
        let config = OracleConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(from_config(&config).unwrap().is_none());
    }
}
