//! # Citation Master
//!
//! Finds supporting passages for the claims of a manuscript in a personal
//! library of PDFs and bibliography records, and inserts formatted citations
//! (APA, MLA, Chicago author-date, IEEE) plus a reference list.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Core data structures (Work, Passage, Claim, Citation, etc.)
//! - [`library`]: Bibliography resolver and passage index
//! - [`engine`]: Claim extraction, evidence retrieval, citation assignment and rendering
//! - [`oracle`]: Relevance oracle plugins with a deadline and circuit breaker
//! - [`utils`]: Citation formatting, PDF and bibliography ingestion, HTTP and other utilities
//! - [`config`]: Configuration management

pub mod config;
pub mod engine;
pub mod library;
pub mod models;
pub mod oracle;
pub mod utils;

// Re-export commonly used types
pub use engine::{AnalysisReport, Analyzer, EngineError};
pub use library::{Library, LibraryError};
pub use models::{Citation, CitationStyle, Work, WorkId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
