//! The citation engine: claim extraction, evidence retrieval, citation
//! assignment and document rendering.
//!
//! [`Analyzer`] drives one analysis run over an immutable library snapshot.
//! The individual stages are usable on their own.

mod assigner;
mod claims;
mod pipeline;
mod render;
mod retriever;

pub use assigner::{CitationAssigner, ReanchorReport, SessionState};
pub use claims::{has_citation_marker, heuristic_score, segment_sentences, ClaimExtractor};
pub use pipeline::{AnalysisReport, AnalysisStats, Analyzer, ClaimOutcome, ClaimReport};
pub use render::{render_document, strip_citations, strip_reference_section};
pub use retriever::{EvidenceRetriever, RetrievalResult};

use thiserror::Error;

use crate::library::LibraryError;
use crate::models::{Span, StyleError};
use crate::oracle::OracleError;

/// Errors raised by the engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Style(#[from] StyleError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("No candidates found for claim at {}..{}", .claim.start, .claim.end)]
    NoCandidatesFound { claim: Span },

    #[error("Unknown claim at {}..{}", .0.start, .0.end)]
    UnknownClaim(Span),
}
