//! Candidates, accepted citations and reference lists.

use serde::{Deserialize, Serialize};

use super::claim::Span;
use super::style::CitationStyle;
use super::work::{Passage, Work, WorkId};

/// A (claim, passage) pairing proposed by the evidence retriever
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Span of the claim this candidate supports
    pub claim: Span,
    pub work_id: WorkId,
    pub passage: Passage,
    /// TF-IDF cosine from the source index
    pub lexical_score: f64,
    /// Final relevance in `[0, 1]` (oracle score, or lexical when degraded)
    pub relevance_score: f64,
    pub confidence: f64,
    /// True when the oracle was unavailable and lexical ranking was used
    #[serde(default)]
    pub degraded: bool,
}

/// An accepted binding of a claim to a work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Style-independent key (the work id)
    pub citation_key: String,
    /// Snapshot of the cited work
    pub work: Work,
    pub claim: Span,
    pub claim_text: String,
    /// Page locator, if the supporting passage has one
    pub locator: Option<String>,
    /// Quoted supporting text, if quotes are enabled
    pub quote: Option<String>,
    /// Number assigned by first appearance (numeric styles)
    pub number: Option<usize>,
    /// Disambiguation suffix for same author and year (author-date styles)
    pub year_suffix: Option<char>,
    /// Rendered in-text form in the active style
    pub in_text_form: String,
    /// Whether the active style requires a page for this citation
    pub needs_page: bool,
    pub relevance: f64,
    pub confidence: f64,
}

impl Citation {
    pub fn work_id(&self) -> &WorkId {
        &self.work.work_id
    }
}

/// One formatted entry in a reference list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub work_id: WorkId,
    pub number: Option<usize>,
    pub text: String,
}

/// A rendered reference list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceList {
    pub style: CitationStyle,
    pub entries: Vec<ReferenceEntry>,
}

impl ReferenceList {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Header line plus one line per entry; numeric styles prefix `[n] `.
    pub fn render(&self) -> String {
        let mut out = String::from(self.style.reference_header());
        out.push('\n');
        for entry in &self.entries {
            out.push('\n');
            if let Some(n) = entry.number.filter(|_| self.style.is_numeric()) {
                out.push_str(&format!("[{}] ", n));
            }
            out.push_str(&entry.text);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_numeric_list() {
        let list = ReferenceList {
            style: CitationStyle::Ieee,
            entries: vec![
                ReferenceEntry {
                    work_id: WorkId::new("w1"),
                    number: Some(1),
                    text: "J. Smith, \"A,\" 2020.".to_string(),
                },
                ReferenceEntry {
                    work_id: WorkId::new("w2"),
                    number: Some(2),
                    text: "B. Jones, \"B,\" 2021.".to_string(),
                },
            ],
        };
        let rendered = list.render();
        assert!(rendered.starts_with("References\n"));
        assert!(rendered.contains("[1] J. Smith"));
        assert!(rendered.contains("[2] B. Jones"));
    }

    #[test]
    fn test_render_author_date_list_has_no_numbers() {
        let list = ReferenceList {
            style: CitationStyle::Mla,
            entries: vec![ReferenceEntry {
                work_id: WorkId::new("w1"),
                number: Some(1),
                text: "Smith, John. \"A.\" 2020.".to_string(),
            }],
        };
        let rendered = list.render();
        assert!(rendered.starts_with("Works Cited"));
        assert!(!rendered.contains("[1]"));
    }
}
