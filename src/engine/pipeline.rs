//! One analysis run: extract, retrieve, assign, render.

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::assigner::{CitationAssigner, SessionState};
use super::claims::ClaimExtractor;
use super::render::{render_document, strip_citations, strip_reference_section};
use super::retriever::{EvidenceRetriever, RetrievalResult};
use super::EngineError;
use crate::config::{CitationsConfig, Config};
use crate::library::{Library, LibraryError};
use crate::models::{Candidate, Citation, CitationStyle, Claim, ReferenceList, Span};
use crate::oracle::GuardedOracle;

/// What happened to one claim
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClaimOutcome {
    /// A new citation was attached
    Cited { citation_key: String },
    /// A citation from the previous session followed the claim
    Reused { citation_key: String },
    /// No passage cleared the relevance threshold
    NoCandidatesFound,
    /// Retrieval failed for this claim only
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimReport {
    pub claim: Claim,
    pub outcome: ClaimOutcome,
    /// Ranked lexically because the oracle was unavailable
    pub degraded: bool,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisStats {
    pub claims_identified: usize,
    pub citations_added: usize,
    pub citations_reused: usize,
    pub sources_used: usize,
    pub degraded_claims: usize,
    pub uncited: usize,
}

/// Everything produced by [`Analyzer::analyze`]
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub style: CitationStyle,
    pub claims: Vec<ClaimReport>,
    pub citations: Vec<Citation>,
    pub references: ReferenceList,
    pub rendered: String,
    pub stats: AnalysisStats,
    /// Previous citations whose claims disappeared
    pub dropped: Vec<Citation>,
    /// State to save alongside the document
    #[serde(skip)]
    pub session: SessionState,
}

/// Runs analyses against a shared library snapshot.
#[derive(Debug, Clone)]
pub struct Analyzer {
    library: Arc<Library>,
    oracle: Option<GuardedOracle>,
    config: Config,
}

impl Analyzer {
    pub fn new(library: Arc<Library>, config: &Config) -> Self {
        Self {
            library,
            oracle: None,
            config: config.clone(),
        }
    }

    pub fn with_oracle(mut self, oracle: Option<GuardedOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    /// Analyze `text` and render it in `style`.
    ///
    /// With a `previous` session, citations follow their edited claims and
    /// those claims skip retrieval. A reference section and in-text citations
    /// left by the session's earlier render are replaced.
    pub async fn analyze(
        &self,
        text: &str,
        style: CitationStyle,
        previous: Option<SessionState>,
    ) -> Result<AnalysisReport, EngineError> {
        if self.library.index().is_empty() {
            return Err(LibraryError::NotIndexed.into());
        }

        let body = strip_reference_section(text);
        let body = match &previous {
            Some(state) => strip_citations(body, &state.citations),
            None => body.to_string(),
        };
        let claims = ClaimExtractor::new(self.config.claims.clone())
            .with_oracle(self.oracle.clone())
            .extract(&body)
            .await;
        tracing::info!(claims = claims.len(), %style, "claims identified");

        let citations_config = CitationsConfig {
            style,
            ..self.config.citations.clone()
        };
        let (mut assigner, dropped) = match previous {
            Some(state) => {
                let mut assigner = CitationAssigner::from_state(state, citations_config);
                assigner.refresh_works(&self.library);
                let report = assigner.reanchor(&claims);
                (assigner, report.dropped)
            }
            None => (CitationAssigner::new(citations_config), Vec::new()),
        };
        let reused: BTreeSet<Span> = assigner.citations().iter().map(|c| c.claim).collect();

        let retriever = EvidenceRetriever::new(self.library.clone(), self.config.retrieval.clone())
            .with_oracle(self.oracle.clone());
        let max_candidates = self.config.retrieval.max_candidates.max(1);
        let pending: Vec<&Claim> = claims.iter().filter(|c| !reused.contains(&c.span)).collect();
        let mut results: Vec<Result<RetrievalResult, EngineError>> = stream::iter(pending)
            .map(|claim| retriever.retrieve(claim, max_candidates))
            .buffered(self.config.retrieval.concurrency.max(1))
            .collect()
            .await;
        results.reverse();

        // Assignment is sequential in document order so keys are deterministic
        let mut reports = Vec::with_capacity(claims.len());
        for claim in &claims {
            if reused.contains(&claim.span) {
                let citation_key = assigner
                    .citation_at(claim.span)
                    .map(|c| c.citation_key.clone())
                    .unwrap_or_default();
                reports.push(ClaimReport {
                    claim: claim.clone(),
                    outcome: ClaimOutcome::Reused { citation_key },
                    degraded: false,
                    candidates: Vec::new(),
                });
                continue;
            }

            let Some(result) = results.pop() else {
                continue;
            };
            reports.push(self.assign_claim(&mut assigner, claim, result));
        }

        let references = assigner.reference_list();
        let include_quotes = self.config.citations.include_quotes;
        let rendered = render_document(&body, assigner.citations(), &references, include_quotes);

        let stats = AnalysisStats {
            claims_identified: claims.len(),
            citations_added: count(&reports, |o| matches!(o, ClaimOutcome::Cited { .. })),
            citations_reused: count(&reports, |o| matches!(o, ClaimOutcome::Reused { .. })),
            sources_used: references.len(),
            degraded_claims: reports.iter().filter(|r| r.degraded).count(),
            uncited: count(&reports, |o| {
                matches!(o, ClaimOutcome::NoCandidatesFound | ClaimOutcome::Failed { .. })
            }),
        };
        tracing::info!(
            citations = stats.citations_added,
            reused = stats.citations_reused,
            sources = stats.sources_used,
            uncited = stats.uncited,
            degraded = stats.degraded_claims,
            "analysis complete"
        );

        Ok(AnalysisReport {
            style,
            claims: reports,
            citations: assigner.citations().to_vec(),
            references,
            rendered,
            stats,
            dropped,
            session: assigner.into_state(),
        })
    }

    fn assign_claim(
        &self,
        assigner: &mut CitationAssigner,
        claim: &Claim,
        result: Result<RetrievalResult, EngineError>,
    ) -> ClaimReport {
        let (candidates, degraded) = match result {
            Ok(r) => (r.candidates, r.degraded),
            Err(e) => {
                tracing::warn!(claim = claim.span.start, error = %e, "retrieval failed");
                return ClaimReport {
                    claim: claim.clone(),
                    outcome: ClaimOutcome::Failed {
                        reason: e.to_string(),
                    },
                    degraded: false,
                    candidates: Vec::new(),
                };
            }
        };

        let outcome = match self.bind_best(assigner, claim, &candidates) {
            Ok(citation) => ClaimOutcome::Cited {
                citation_key: citation.citation_key,
            },
            Err(EngineError::NoCandidatesFound { .. }) => {
                tracing::debug!(claim = claim.span.start, "no supporting source");
                ClaimOutcome::NoCandidatesFound
            }
            Err(e) => ClaimOutcome::Failed {
                reason: e.to_string(),
            },
        };
        ClaimReport {
            claim: claim.clone(),
            outcome,
            degraded,
            candidates,
        }
    }

    fn bind_best(
        &self,
        assigner: &mut CitationAssigner,
        claim: &Claim,
        candidates: &[Candidate],
    ) -> Result<Citation, EngineError> {
        let best = candidates
            .first()
            .ok_or(EngineError::NoCandidatesFound { claim: claim.span })?;
        let work = self
            .library
            .work(&best.work_id)
            .ok_or_else(|| LibraryError::UnknownWork(best.work_id.clone()))?;
        Ok(assigner.assign(claim, best, work))
    }
}

fn count(reports: &[ClaimReport], pred: impl Fn(&ClaimOutcome) -> bool) -> usize {
    reports.iter().filter(|r| pred(&r.outcome)).count()
}
