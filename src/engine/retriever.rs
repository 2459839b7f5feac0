//! Evidence retrieval: lexical shortlist, oracle re-ranking, filtering.

use futures_util::future::join_all;
use std::sync::Arc;

use super::EngineError;
use crate::config::RetrievalConfig;
use crate::library::Library;
use crate::models::{Candidate, Claim, Passage};
use crate::oracle::{GuardedOracle, OracleOutcome};
use crate::utils::{best_per_work, compare_candidates};

/// Candidates for one claim
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    /// Ranked best first
    pub candidates: Vec<Candidate>,
    /// True when the shortlist was ranked lexically because an oracle call
    /// failed or timed out
    pub degraded: bool,
}

/// Finds and ranks passages supporting a claim.
///
/// The library is a shared read-only snapshot, so many retrievals can run
/// concurrently.
#[derive(Debug, Clone)]
pub struct EvidenceRetriever {
    library: Arc<Library>,
    oracle: Option<GuardedOracle>,
    config: RetrievalConfig,
}

impl EvidenceRetriever {
    pub fn new(library: Arc<Library>, config: RetrievalConfig) -> Self {
        Self {
            library,
            oracle: None,
            config,
        }
    }

    pub fn with_oracle(mut self, oracle: Option<GuardedOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Up to `max_candidates` candidates for `claim`, best first.
    ///
    /// An empty result is not an error; the library being empty is
    /// ([`crate::library::LibraryError::NotIndexed`]).
    pub async fn retrieve(
        &self,
        claim: &Claim,
        max_candidates: usize,
    ) -> Result<RetrievalResult, EngineError> {
        let shortlist = self.library.search(&claim.text, self.config.shortlist_size)?;
        if shortlist.is_empty() {
            tracing::debug!(claim = claim.span.start, "no lexical matches");
            return Ok(RetrievalResult::default());
        }

        let (mut candidates, degraded) = self.score_shortlist(claim, shortlist).await;
        if degraded {
            tracing::warn!(
                claim = claim.span.start,
                "relevance oracle unavailable; ranking by lexical similarity"
            );
        }

        let floor = if degraded {
            self.config.degraded_min_lexical
        } else {
            self.config.min_relevance
        };
        candidates.retain(|c| c.relevance_score >= floor);
        if self.config.one_per_work {
            candidates = best_per_work(candidates);
        } else {
            candidates.sort_by(compare_candidates);
        }
        candidates.truncate(max_candidates);

        tracing::debug!(
            claim = claim.span.start,
            candidates = candidates.len(),
            degraded,
            "retrieved evidence"
        );
        Ok(RetrievalResult {
            candidates,
            degraded,
        })
    }

    async fn score_shortlist(
        &self,
        claim: &Claim,
        shortlist: Vec<(Passage, f64)>,
    ) -> (Vec<Candidate>, bool) {
        let oracle = self.oracle.as_ref().filter(|o| o.is_available());
        let outcomes = match oracle {
            Some(oracle) => {
                join_all(
                    shortlist
                        .iter()
                        .map(|(passage, _)| oracle.score(&claim.text, &passage.text)),
                )
                .await
            }
            None => vec![OracleOutcome::Failed("no oracle".to_string()); shortlist.len()],
        };

        // Oracle relevance and TF-IDF cosine are not comparable, so a single
        // failed call puts the whole shortlist on the lexical scale.
        let scores: Option<Vec<_>> = outcomes.into_iter().map(OracleOutcome::ok).collect();
        let degraded = scores.is_none();
        let candidates = match scores {
            Some(scores) => shortlist
                .into_iter()
                .zip(scores)
                .map(|((passage, lexical), score)| {
                    self.candidate(claim, passage, lexical, score.relevance(), score.confidence(), false)
                })
                .collect(),
            None => shortlist
                .into_iter()
                .map(|(passage, lexical)| {
                    let confidence = lexical * self.config.degraded_confidence_factor;
                    self.candidate(claim, passage, lexical, lexical, confidence, true)
                })
                .collect(),
        };
        (candidates, degraded)
    }

    fn candidate(
        &self,
        claim: &Claim,
        passage: Passage,
        lexical: f64,
        relevance: f64,
        confidence: f64,
        degraded: bool,
    ) -> Candidate {
        Candidate {
            claim: claim.span,
            work_id: passage.work_id.clone(),
            passage,
            lexical_score: lexical,
            relevance_score: relevance,
            confidence: confidence.clamp(0.0, 1.0),
            degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClaimKind, Decision, MetadataBuilder, PageText, Span};
    use crate::oracle::MockOracle;
    use std::time::Duration;

    fn claim(text: &str) -> Claim {
        Claim {
            span: Span::new(0, text.len()),
            text: text.to_string(),
            needs_support: true,
            confidence: 1.0,
            score: 0.7,
            kind: ClaimKind::Factual,
            decided_by: Decision::Heuristic,
        }
    }

    fn library() -> Arc<Library> {
        let mut library = Library::new();
        library
            .add_work(
                MetadataBuilder::new("Forest carbon").author("Smith").year("2020").build(),
                &[
                    PageText::new(1, "Trees sequester carbon dioxide in their biomass"),
                    PageText::new(2, "Old forests store carbon in soils"),
                ],
            )
            .unwrap();
        library
            .add_work(
                MetadataBuilder::new("Ocean heat").author("Lee").year("2019").build(),
                &[PageText::new(1, "Oceans absorb heat and carbon dioxide")],
            )
            .unwrap();
        library.snapshot()
    }

    fn guarded(mock: MockOracle) -> GuardedOracle {
        GuardedOracle::new(Arc::new(mock), Duration::from_secs(1), 10)
    }

    #[tokio::test]
    async fn test_one_candidate_per_work() {
        let retriever = EvidenceRetriever::new(library(), RetrievalConfig::default())
            .with_oracle(Some(guarded(MockOracle::new().with_default_score(0.8))));
        let result = retriever.retrieve(&claim("Trees absorb carbon dioxide."), 5).await.unwrap();

        assert!(!result.degraded);
        assert_eq!(result.candidates.len(), 2);
        assert_ne!(result.candidates[0].work_id, result.candidates[1].work_id);
        assert!(result.candidates.iter().all(|c| c.relevance_score == 0.8));
    }

    #[tokio::test]
    async fn test_threshold_filters_candidates() {
        let oracle = MockOracle::new()
            .with_score("sequester", 0.9)
            .with_default_score(0.05);
        let retriever =
            EvidenceRetriever::new(library(), RetrievalConfig::default()).with_oracle(Some(guarded(oracle)));
        let result = retriever.retrieve(&claim("Trees absorb carbon dioxide."), 5).await.unwrap();

        assert_eq!(result.candidates.len(), 1);
        assert!(result.candidates[0].passage.text.contains("sequester"));
        assert_eq!(result.candidates[0].passage.page, Some(1));
    }

    #[tokio::test]
    async fn test_failing_oracle_degrades_to_lexical() {
        let retriever = EvidenceRetriever::new(library(), RetrievalConfig::default())
            .with_oracle(Some(guarded(MockOracle::new().failing())));
        let result = retriever.retrieve(&claim("Trees absorb carbon dioxide."), 5).await.unwrap();

        assert!(result.degraded);
        assert!(!result.candidates.is_empty());
        for candidate in &result.candidates {
            assert!(candidate.degraded);
            assert_eq!(candidate.relevance_score, candidate.lexical_score);
            assert!(candidate.confidence <= candidate.lexical_score * 0.5 + 1e-9);
        }
    }

    #[tokio::test]
    async fn test_slow_oracle_degrades_to_lexical() {
        let slow = MockOracle::new()
            .with_default_score(0.9)
            .with_delay(Duration::from_millis(200));
        let oracle = GuardedOracle::new(Arc::new(slow), Duration::from_millis(20), 10);
        let retriever =
            EvidenceRetriever::new(library(), RetrievalConfig::default()).with_oracle(Some(oracle));
        let result = retriever.retrieve(&claim("Trees absorb carbon dioxide."), 5).await.unwrap();

        assert!(result.degraded);
        assert!(!result.candidates.is_empty());
        assert!(result.candidates.iter().all(|c| c.degraded));
    }

    #[tokio::test]
    async fn test_partial_oracle_failure_ranks_lexically() {
        let oracle = MockOracle::new().with_default_score(0.95).failing_on("Oceans");
        let retriever = EvidenceRetriever::new(library(), RetrievalConfig::default())
            .with_oracle(Some(guarded(oracle)));
        let result = retriever.retrieve(&claim("Oceans absorb carbon dioxide."), 5).await.unwrap();

        assert!(result.degraded);
        for candidate in &result.candidates {
            assert!(candidate.degraded);
            assert_eq!(candidate.relevance_score, candidate.lexical_score);
        }
        assert!(result
            .candidates
            .windows(2)
            .all(|w| w[0].lexical_score >= w[1].lexical_score));
    }

    #[tokio::test]
    async fn test_degraded_mode_keeps_weak_lexical_matches() {
        let mut library = Library::new();
        library
            .add_work(
                MetadataBuilder::new("Forest dynamics").author("Moreno").year("2018").build(),
                &[PageText::new(
                    12,
                    "Mature stands continue to accumulate biomass for centuries after disturbance. \
                     Soil organic matter in temperate forests grows slowly but steadily over time. \
                     Our plots in the Pacific Northwest were resampled every five years. \
                     Net ecosystem exchange stayed positive in most old growth sites, so mature stands \
                     remain sinks for atmospheric carbon.",
                )],
            )
            .unwrap();
        let library = library.snapshot();
        let claim = claim("Old forests keep absorbing carbon.");

        let lexical = library.search(&claim.text, 20).unwrap();
        assert_eq!(lexical.len(), 1);
        assert!(lexical[0].1 < RetrievalConfig::default().min_relevance);

        let retriever = EvidenceRetriever::new(library, RetrievalConfig::default())
            .with_oracle(Some(guarded(MockOracle::new().failing())));
        let result = retriever.retrieve(&claim, 3).await.unwrap();
        assert!(result.degraded);
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].passage.page, Some(12));
    }

    #[tokio::test]
    async fn test_max_candidates_and_order() {
        let mut config = RetrievalConfig::default();
        config.one_per_work = false;
        config.min_relevance = 0.0;
        let retriever = EvidenceRetriever::new(library(), config);
        let result = retriever.retrieve(&claim("carbon dioxide"), 2).await.unwrap();

        assert_eq!(result.candidates.len(), 2);
        assert!(result.candidates[0].relevance_score >= result.candidates[1].relevance_score);
    }

    #[tokio::test]
    async fn test_empty_library_is_an_error() {
        let retriever = EvidenceRetriever::new(Library::new().snapshot(), RetrievalConfig::default());
        let err = retriever.retrieve(&claim("anything"), 3).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Library(crate::library::LibraryError::NotIndexed)
        ));
    }
}
