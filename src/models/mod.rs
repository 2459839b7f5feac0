//! Core data models for works, passages, claims and citations.

mod citation;
mod claim;
mod style;
mod work;

pub use citation::{Candidate, Citation, ReferenceEntry, ReferenceList};
pub use claim::{Claim, ClaimKind, Decision, Span};
pub use style::{CitationStyle, StyleError};
pub use work::{
    Author, MetadataBuilder, PageText, Passage, RawMetadata, Work, WorkId, WorkKind,
};
