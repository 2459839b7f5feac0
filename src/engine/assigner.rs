//! Citation assignment for one document session.
//!
//! The assigner owns the accepted citations of a document. Numbers and
//! disambiguation suffixes are derived data: every mutation recomputes them
//! from the current citation set in document order, so removing a citation
//! never leaves a gap.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use strsim::normalized_levenshtein;

use super::EngineError;
use crate::config::CitationsConfig;
use crate::library::Library;
use crate::models::{
    Candidate, Citation, CitationStyle, Claim, ReferenceEntry, ReferenceList, Span, Work, WorkId,
};
use crate::utils::text::{collapse_whitespace, normalize_title};
use crate::utils::{format_in_text, format_reference_with_suffix, truncate_chars};

/// Longest quote inserted next to a citation, in characters
const MAX_QUOTE_CHARS: usize = 200;

/// Citations of one document, saved alongside it between runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub style: CitationStyle,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

impl SessionState {
    /// Works referenced by at least one citation
    pub fn cited_works(&self) -> BTreeSet<WorkId> {
        self.citations.iter().map(|c| c.work_id().clone()).collect()
    }
}

/// Outcome of moving previous citations onto freshly extracted claims
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReanchorReport {
    /// (previous span, new span) for every citation that followed its claim
    pub anchored: Vec<(Span, Span)>,
    /// Citations whose claim no longer exists
    pub dropped: Vec<Citation>,
}

/// Owns the citations and reference list of one document.
#[derive(Debug, Clone)]
pub struct CitationAssigner {
    state: SessionState,
    config: CitationsConfig,
}

impl CitationAssigner {
    pub fn new(config: CitationsConfig) -> Self {
        Self {
            state: SessionState {
                style: config.style,
                citations: Vec::new(),
            },
            config,
        }
    }

    /// Resume a saved session, rendering it in `config.style`
    pub fn from_state(state: SessionState, config: CitationsConfig) -> Self {
        let mut assigner = Self { state, config };
        assigner.state.style = assigner.config.style;
        assigner.recompute();
        assigner
    }

    pub fn style(&self) -> CitationStyle {
        self.state.style
    }

    pub fn citations(&self) -> &[Citation] {
        &self.state.citations
    }

    pub fn citation_at(&self, span: Span) -> Option<&Citation> {
        self.state.citations.iter().find(|c| c.claim == span)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn into_state(self) -> SessionState {
        self.state
    }

    /// Bind `claim` to the work behind `candidate`.
    ///
    /// A citation already attached to the same claim span is replaced.
    pub fn assign(&mut self, claim: &Claim, candidate: &Candidate, work: &Work) -> Citation {
        let (locator, quote) = if self.config.include_quotes {
            (
                candidate.passage.locator(),
                Some(truncate_chars(&collapse_whitespace(&candidate.passage.text), MAX_QUOTE_CHARS)),
            )
        } else {
            (None, None)
        };

        let citation = Citation {
            citation_key: work.work_id.as_str().to_string(),
            work: work.clone(),
            claim: claim.span,
            claim_text: claim.text.clone(),
            locator,
            quote,
            number: None,
            year_suffix: None,
            in_text_form: String::new(),
            needs_page: false,
            relevance: candidate.relevance_score,
            confidence: candidate.confidence,
        };

        self.state.citations.retain(|c| c.claim != claim.span);
        let position = self
            .state
            .citations
            .partition_point(|c| c.claim < claim.span);
        self.state.citations.insert(position, citation);
        self.recompute();

        tracing::debug!(claim = claim.span.start, work_id = %work.work_id, "citation assigned");
        self.state.citations[position].clone()
    }

    /// Remove the citation on `span`; the remaining keys are renumbered
    pub fn remove(&mut self, span: Span) -> Result<Citation, EngineError> {
        let index = self
            .state
            .citations
            .iter()
            .position(|c| c.claim == span)
            .ok_or(EngineError::UnknownClaim(span))?;
        let removed = self.state.citations.remove(index);
        self.recompute();
        Ok(removed)
    }

    /// Switch to another style; keys and forms are recomputed
    pub fn restyle(&mut self, style: CitationStyle) {
        self.state.style = style;
        self.config.style = style;
        self.recompute();
    }

    /// Replace work snapshots with the library's current records.
    ///
    /// Citations whose work has left the library are kept with their
    /// snapshot.
    pub fn refresh_works(&mut self, library: &Library) {
        for citation in &mut self.state.citations {
            if let Some(work) = library.work(citation.work_id()) {
                citation.work = work.clone();
            }
        }
        self.recompute();
    }

    /// Move previous citations onto the claims of an edited document.
    ///
    /// A citation follows a claim when their spans overlap by at least
    /// `reanchor_overlap` (IoU) and their texts are at least
    /// `reanchor_text_similarity` alike, or when the claim text is unchanged
    /// and merely shifted. Pairs are matched greedily, best first. Citations
    /// left without a claim are dropped.
    pub fn reanchor(&mut self, claims: &[Claim]) -> ReanchorReport {
        let previous = std::mem::take(&mut self.state.citations);

        let mut pairs: Vec<(f64, usize, usize)> = Vec::new();
        for (ci, citation) in previous.iter().enumerate() {
            let old_text = comparable(&citation.claim_text);
            for (ki, claim) in claims.iter().enumerate() {
                let new_text = comparable(&claim.text);
                let overlap = citation.claim.overlap_ratio(&claim.span);
                let similarity = normalized_levenshtein(&old_text, &new_text);
                let shifted = old_text == new_text;
                let overlaps = overlap >= self.config.reanchor_overlap
                    && similarity >= self.config.reanchor_text_similarity;
                if overlaps || shifted {
                    pairs.push((overlap + similarity, ci, ki));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let mut used_citations = BTreeSet::new();
        let mut used_claims = BTreeSet::new();
        let mut matches: BTreeMap<usize, usize> = BTreeMap::new();
        for (_, ci, ki) in pairs {
            if used_citations.contains(&ci) || used_claims.contains(&ki) {
                continue;
            }
            used_citations.insert(ci);
            used_claims.insert(ki);
            matches.insert(ci, ki);
        }

        let mut report = ReanchorReport::default();
        for (ci, mut citation) in previous.into_iter().enumerate() {
            match matches.get(&ci) {
                Some(&ki) => {
                    let claim = &claims[ki];
                    report.anchored.push((citation.claim, claim.span));
                    citation.claim = claim.span;
                    citation.claim_text = claim.text.clone();
                    self.state.citations.push(citation);
                }
                None => report.dropped.push(citation),
            }
        }
        self.state.citations.sort_by_key(|c| c.claim);
        self.recompute();

        tracing::debug!(
            anchored = report.anchored.len(),
            dropped = report.dropped.len(),
            "re-anchored citations"
        );
        report
    }

    /// One entry per cited work.
    ///
    /// Numeric styles list entries by number; author-date styles sort by
    /// author, year and suffix.
    pub fn reference_list(&self) -> ReferenceList {
        let mut seen = BTreeSet::new();
        let mut firsts: Vec<&Citation> = self
            .state
            .citations
            .iter()
            .filter(|c| seen.insert(c.work_id().clone()))
            .collect();

        if !self.state.style.is_numeric() {
            firsts.sort_by(|a, b| {
                sort_name(&a.work)
                    .cmp(&sort_name(&b.work))
                    .then(a.work.year.cmp(&b.work.year))
                    .then(a.year_suffix.cmp(&b.year_suffix))
                    .then_with(|| normalize_title(&a.work.title).cmp(&normalize_title(&b.work.title)))
                    .then_with(|| a.work_id().cmp(b.work_id()))
            });
        }

        ReferenceList {
            style: self.state.style,
            entries: firsts
                .into_iter()
                .map(|c| ReferenceEntry {
                    work_id: c.work_id().clone(),
                    number: c.number,
                    text: format_reference_with_suffix(&c.work, self.state.style, c.year_suffix),
                })
                .collect(),
        }
    }

    /// Recompute numbers, suffixes and rendered forms from scratch
    fn recompute(&mut self) {
        let style = self.state.style;
        self.state.citations.sort_by_key(|c| c.claim);

        let mut numbers: HashMap<WorkId, usize> = HashMap::new();
        for citation in &self.state.citations {
            let next = numbers.len() + 1;
            numbers.entry(citation.work_id().clone()).or_insert(next);
        }
        let suffixes = if style.is_numeric() {
            HashMap::new()
        } else {
            year_suffixes(&self.state.citations)
        };

        for citation in &mut self.state.citations {
            citation.citation_key = citation.work_id().as_str().to_string();
            citation.number = if style.is_numeric() {
                numbers.get(citation.work_id()).copied()
            } else {
                None
            };
            citation.year_suffix = suffixes.get(citation.work_id()).copied();
            citation.needs_page = !style.is_numeric();
            citation.in_text_form = format_in_text(citation, style);
        }
    }
}

fn comparable(text: &str) -> String {
    collapse_whitespace(text).to_lowercase()
}

/// Surname used to group and sort author-date entries; title when anonymous
fn sort_name(work: &Work) -> String {
    match work.first_author_surname() {
        Some(surname) => normalize_title(surname),
        None => normalize_title(&work.title),
    }
}

/// a/b/c suffixes for distinct works that share first-author surname and year
fn year_suffixes(citations: &[Citation]) -> HashMap<WorkId, char> {
    let mut groups: BTreeMap<(String, Option<i32>), BTreeMap<WorkId, &Work>> = BTreeMap::new();
    for citation in citations {
        groups
            .entry((sort_name(&citation.work), citation.work.year))
            .or_default()
            .insert(citation.work_id().clone(), &citation.work);
    }

    let mut suffixes = HashMap::new();
    for works in groups.into_values().filter(|w| w.len() > 1) {
        let mut ordered: Vec<&Work> = works.into_values().collect();
        ordered.sort_by(|a, b| {
            normalize_title(&a.title)
                .cmp(&normalize_title(&b.title))
                .then_with(|| a.work_id.cmp(&b.work_id))
        });
        for (work, suffix) in ordered.into_iter().zip('a'..='z') {
            suffixes.insert(work.work_id.clone(), suffix);
        }
    }
    suffixes
}
