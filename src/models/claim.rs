//! Claims detected in a manuscript and their text spans.

use serde::{Deserialize, Serialize};

/// Half-open byte range `[start, end)` into the manuscript text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Intersection-over-union of two spans, in `[0, 1]`
    pub fn overlap_ratio(&self, other: &Span) -> f64 {
        let inter_start = self.start.max(other.start);
        let inter_end = self.end.min(other.end);
        let intersection = inter_end.saturating_sub(inter_start);
        let union = self.end.max(other.end) - self.start.min(other.start);
        if union == 0 {
            return if self == other { 1.0 } else { 0.0 };
        }
        intersection as f64 / union as f64
    }

    /// Slice the span out of `text`, returning `None` if it is out of range
    /// or not on a character boundary.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.start..self.end)
    }
}

/// Rough category of an assertion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    #[default]
    Factual,
    Statistical,
    Theoretical,
    Methodological,
    Interpretation,
}

impl ClaimKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Factual => "factual",
            Self::Statistical => "statistical",
            Self::Theoretical => "theoretical",
            Self::Methodological => "methodological",
            Self::Interpretation => "interpretation",
        }
    }
}

/// How the support decision for a claim was reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Heuristic score was decisive
    #[default]
    Heuristic,
    /// Ambiguous score, resolved by the relevance oracle
    Oracle,
    /// Ambiguous score, oracle unavailable; fallback threshold applied
    Degraded,
}

/// A sentence (or sentence group) asserting something
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub span: Span,
    pub text: String,
    /// Whether the claim should carry a citation
    pub needs_support: bool,
    /// Confidence in the `needs_support` decision, in `[0, 1]`
    pub confidence: f64,
    /// Raw heuristic score
    pub score: f64,
    pub kind: ClaimKind,
    pub decided_by: Decision,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_ratio() {
        let a = Span::new(0, 10);
        let b = Span::new(5, 15);
        assert!((a.overlap_ratio(&b) - 5.0 / 15.0).abs() < 1e-9);
        assert_eq!(a.overlap_ratio(&a), 1.0);
        assert_eq!(a.overlap_ratio(&Span::new(20, 30)), 0.0);
    }

    #[test]
    fn test_span_slice() {
        let text = "Trees absorb carbon.";
        assert_eq!(Span::new(0, 5).slice(text), Some("Trees"));
        assert_eq!(Span::new(0, 100).slice(text), None);
        assert_eq!(Span::new(7, 3).len(), 0);
    }
}
