//! Utility modules supporting citation matching.
//!
//! - [`text`]: tokenisation, stopwords and normalisation used for matching and identity keys
//! - [`format_in_text`] / [`format_reference`]: per-style rendering of citations and references
//! - [`best_per_work`], [`are_duplicates`], [`find_matching_work`]: candidate and work deduplication
//! - [`HttpClient`]: HTTP client with built-in rate limiting
//! - [`with_retry`]: retry with exponential backoff on transient oracle errors
//! - [`CircuitBreaker`]: stops calling a failing oracle
//! - [`extract_pdf`], [`load_bibliography`], [`Document`]: ingestion adapters
//!
//! # Rendering
//!
//! ```rust
//! use citation_master::models::{CitationStyle, MetadataBuilder};
//! use citation_master::library::BibliographyResolver;
//! use citation_master::utils::format_reference;
//!
//! let mut resolver = BibliographyResolver::new();
//! let raw = MetadataBuilder::new("Forest carbon").author("Smith").year("2020").build();
//! let work = resolver.resolve(raw).unwrap();
//! assert_eq!(format_reference(&work, CitationStyle::Apa), "Smith. (2020). Forest carbon.");
//! ```

mod bibtxt;
mod circuit_breaker;
mod cite;
mod dedup;
mod document;
mod http;
mod pdf;
mod retry;
pub mod text;

pub use bibtxt::{load_bibliography, parse_entry, parse_json_records, parse_plain_text, BibliographyError};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitResult, CircuitState};
pub use cite::{
    format_in_text, format_reference, format_reference_with_suffix, get_structured_citation,
    in_text, StructuredCitation, ANONYMOUS, NO_DATE, UNTITLED,
};
pub use dedup::{
    are_duplicates, best_per_work, compare_candidates, find_duplicates, find_matching_work,
    title_similarity, word_overlap, TITLE_SIMILARITY_THRESHOLD, WORD_OVERLAP_THRESHOLD,
};
pub use document::{decode, Document, DocumentError};
pub use http::HttpClient;
pub use pdf::{
    academic_confidence, clean_title, extract_doi, extract_pdf, extract_title, extract_year,
    metadata_from_filename, ExtractedPdf, PdfExtractError,
};
pub use retry::{oracle_retry_config, with_retry, RetryConfig, TransientError};
pub use text::truncate_chars;
