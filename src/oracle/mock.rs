//! Mock oracle for testing and offline runs.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::models::ClaimKind;
use crate::oracle::{ClaimJudgement, OracleCapabilities, OracleError, OracleScore, RelevanceOracle};
use crate::utils::word_overlap;

/// A mock oracle that returns scripted scores.
///
/// Scores are looked up by passage substring (first matching rule wins). If
/// no rule matches, the default score is used; without a default, the word
/// overlap between claim and passage is returned.
#[derive(Debug, Default)]
pub struct MockOracle {
    rules: Vec<(String, f64)>,
    default_score: Option<f64>,
    confidence: Option<f64>,
    judgement: Option<f64>,
    fail: bool,
    fail_on: Vec<String>,
    delay: Option<Duration>,
    limiter: Option<DefaultDirectRateLimiter>,
    calls: AtomicUsize,
}

impl MockOracle {
    /// Create a new mock oracle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `score` for passages containing `needle`
    pub fn with_score(mut self, needle: impl Into<String>, score: f64) -> Self {
        self.rules.push((needle.into(), score));
        self
    }

    /// Score returned when no rule matches
    pub fn with_default_score(mut self, score: f64) -> Self {
        self.default_score = Some(score);
        self
    }

    /// Confidence reported with every score (defaults to 1.0)
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Enable claim judgement, answering with a fixed probability
    pub fn with_judgement(mut self, probability: f64) -> Self {
        self.judgement = Some(probability);
        self
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every call fail with a network error
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Make scoring fail for passages containing `needle`
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on.push(needle.into());
        self
    }

    /// Admit at most `per_second` calls per second through [`RelevanceOracle::ready`]
    pub fn with_rate_limit(mut self, per_second: u32) -> Self {
        self.limiter = NonZeroU32::new(per_second).map(|rps| RateLimiter::direct(Quota::per_second(rps)));
        self
    }

    /// Number of calls received so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(OracleError::Network("mock oracle failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RelevanceOracle for MockOracle {
    fn id(&self) -> &str {
        "mock"
    }

    fn capabilities(&self) -> OracleCapabilities {
        if self.judgement.is_some() {
            OracleCapabilities::SCORE | OracleCapabilities::JUDGE_CLAIM
        } else {
            OracleCapabilities::SCORE
        }
    }

    async fn ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    async fn score(&self, claim: &str, passage: &str) -> Result<OracleScore, OracleError> {
        self.enter().await?;
        if self.fail_on.iter().any(|needle| passage.contains(needle.as_str())) {
            return Err(OracleError::Network("mock oracle failure".to_string()));
        }
        let score = self
            .rules
            .iter()
            .find(|(needle, _)| passage.contains(needle.as_str()))
            .map(|(_, score)| *score)
            .or(self.default_score)
            .unwrap_or_else(|| word_overlap(claim, passage));
        OracleScore::new(score, self.confidence.unwrap_or(1.0))
    }

    async fn judge_claim(&self, _sentence: &str) -> Result<ClaimJudgement, OracleError> {
        let Some(probability) = self.judgement else {
            return Err(OracleError::NotImplemented);
        };
        self.enter().await?;
        ClaimJudgement::new(probability, Some(ClaimKind::Factual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_scores() {
        let oracle = MockOracle::new()
            .with_score("sequester", 0.9)
            .with_default_score(0.1)
            .with_confidence(0.7);

        let hit = oracle.score("claim", "Trees sequester carbon").await.unwrap();
        let miss = oracle.score("claim", "Ocean warming").await.unwrap();
        assert_eq!(hit.relevance(), 0.9);
        assert_eq!(hit.confidence(), 0.7);
        assert_eq!(miss.relevance(), 0.1);
        assert_eq!(oracle.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_oracle() {
        let oracle = MockOracle::new().failing();
        assert!(matches!(
            oracle.score("a", "b").await,
            Err(OracleError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_judgement_requires_capability() {
        let oracle = MockOracle::new();
        assert!(!oracle.supports_claim_judgement());
        assert!(matches!(
            oracle.judge_claim("x").await,
            Err(OracleError::NotImplemented)
        ));

        let judging = MockOracle::new().with_judgement(0.8);
        assert!(judging.supports_claim_judgement());
        let verdict = judging.judge_claim("x").await.unwrap();
        assert_eq!(verdict.needs_citation(), 0.8);
    }

    #[tokio::test]
    async fn test_failing_on_passage() {
        let oracle = MockOracle::new().with_default_score(0.7).failing_on("ocean");
        assert!(oracle.score("a", "forest soils").await.is_ok());
        assert!(oracle.score("a", "ocean heat").await.is_err());
        assert_eq!(oracle.call_count(), 2);
    }

    #[test]
    fn test_overlap_fallback_without_rules() {
        let oracle = MockOracle::new();
        let score = tokio_test::block_on(oracle.score("trees absorb carbon", "trees store carbon")).unwrap();
        assert_eq!(score.relevance(), 0.5);
        assert_eq!(score.confidence(), 1.0);
    }
}
