//! Passage index with TF-IDF cosine scoring.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::LibraryError;
use crate::models::{PageText, Passage, WorkId};
use crate::utils::text::{collapse_whitespace, normalize_for_matching, tokenize};

/// Target chunk size in bytes
pub const CHUNK_TARGET: usize = 500;

/// Chunks shorter than this are dropped unless a page has nothing longer
pub const CHUNK_MIN: usize = 50;

/// Passage counts for `library stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub works: usize,
    pub passages: usize,
    pub pages: usize,
    pub characters: usize,
}

/// Stored form: passages only; term statistics are rebuilt on load
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredIndex {
    passages: Vec<Passage>,
}

/// Holds passages of every indexed work and answers lexical queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "StoredIndex", into = "StoredIndex")]
pub struct SourceIndex {
    passages: Vec<Passage>,
    term_counts: Vec<BTreeMap<String, u32>>,
    doc_freq: HashMap<String, usize>,
    postings: HashMap<String, Vec<usize>>,
    norms: Vec<f64>,
}

impl From<StoredIndex> for SourceIndex {
    fn from(stored: StoredIndex) -> Self {
        let mut index = SourceIndex {
            passages: stored.passages,
            ..Default::default()
        };
        index.rebuild();
        index
    }
}

impl From<SourceIndex> for StoredIndex {
    fn from(index: SourceIndex) -> Self {
        StoredIndex {
            passages: index.passages,
        }
    }
}

impl SourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the pages of a work, replacing any passages it already had.
    ///
    /// Returns the number of passages indexed.
    pub fn add_work(&mut self, work_id: &WorkId, pages: &[PageText]) -> usize {
        self.passages.retain(|p| &p.work_id != work_id);

        let passages: Vec<Passage> = chunk_pages(pages)
            .into_iter()
            .enumerate()
            .map(|(ordinal, (page, text))| Passage {
                work_id: work_id.clone(),
                ordinal,
                page,
                normalized: normalize_for_matching(&text),
                text,
            })
            .filter(|p| !p.normalized.is_empty())
            .collect();
        let count = passages.len();
        self.passages.extend(passages);
        self.rebuild();

        tracing::debug!(work_id = %work_id, passages = count, "indexed work");
        count
    }

    /// Remove a work's passages; returns whether any were removed
    pub fn remove_work(&mut self, work_id: &WorkId) -> bool {
        let before = self.passages.len();
        self.passages.retain(|p| &p.work_id != work_id);
        let removed = self.passages.len() != before;
        if removed {
            self.rebuild();
        }
        removed
    }

    pub fn contains_work(&self, work_id: &WorkId) -> bool {
        self.passages.iter().any(|p| &p.work_id == work_id)
    }

    pub fn passages_for<'a>(&'a self, work_id: &'a WorkId) -> impl Iterator<Item = &'a Passage> {
        self.passages.iter().filter(move |p| &p.work_id == work_id)
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Rank passages against `query` by TF-IDF cosine similarity.
    ///
    /// Results are ordered by score (descending), then work id and passage
    /// ordinal (ascending). Passages sharing no term with the query are not
    /// returned.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<(Passage, f64)>, LibraryError> {
        if self.passages.is_empty() {
            return Err(LibraryError::NotIndexed);
        }

        let mut query_counts: BTreeMap<String, u32> = BTreeMap::new();
        for term in tokenize(query) {
            *query_counts.entry(term).or_default() += 1;
        }
        let query_weights: Vec<(&str, f64)> = query_counts
            .iter()
            .map(|(term, &count)| (term.as_str(), count as f64 * self.idf(term)))
            .collect();
        let query_norm = query_weights.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if query_norm == 0.0 {
            return Ok(Vec::new());
        }

        let mut dots: HashMap<usize, f64> = HashMap::new();
        for (term, query_weight) in &query_weights {
            let Some(posting) = self.postings.get(*term) else {
                continue;
            };
            let idf = self.idf(term);
            for &i in posting {
                let tf = self.term_counts[i].get(*term).copied().unwrap_or(0) as f64;
                *dots.entry(i).or_default() += query_weight * tf * idf;
            }
        }

        let mut scored: Vec<(usize, f64)> = dots
            .into_iter()
            .filter(|(i, _)| self.norms[*i] > 0.0)
            .map(|(i, dot)| (i, (dot / (query_norm * self.norms[i])).min(1.0)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|(ia, sa), (ib, sb)| {
            sb.total_cmp(sa)
                .then_with(|| self.passages[*ia].work_id.cmp(&self.passages[*ib].work_id))
                .then_with(|| self.passages[*ia].ordinal.cmp(&self.passages[*ib].ordinal))
        });
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| (self.passages[i].clone(), score))
            .collect())
    }

    pub fn stats(&self) -> IndexStats {
        let works: BTreeSet<&WorkId> = self.passages.iter().map(|p| &p.work_id).collect();
        let pages: BTreeSet<(&WorkId, Option<u32>)> = self
            .passages
            .iter()
            .map(|p| (&p.work_id, p.page))
            .collect();
        IndexStats {
            works: works.len(),
            passages: self.passages.len(),
            pages: pages.len(),
            characters: self.passages.iter().map(|p| p.text.chars().count()).sum(),
        }
    }

    /// Smoothed inverse document frequency
    fn idf(&self, term: &str) -> f64 {
        let n = self.passages.len() as f64;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        ((1.0 + n) / (1.0 + df)).ln() + 1.0
    }

    fn rebuild(&mut self) {
        self.term_counts = self
            .passages
            .iter()
            .map(|p| {
                let mut counts: BTreeMap<String, u32> = BTreeMap::new();
                for term in p.normalized.split_whitespace() {
                    *counts.entry(term.to_string()).or_default() += 1;
                }
                counts
            })
            .collect();

        self.doc_freq.clear();
        self.postings.clear();
        for (i, counts) in self.term_counts.iter().enumerate() {
            for term in counts.keys() {
                *self.doc_freq.entry(term.clone()).or_default() += 1;
                self.postings.entry(term.clone()).or_default().push(i);
            }
        }

        self.norms = self
            .term_counts
            .iter()
            .map(|counts| {
                counts
                    .iter()
                    .map(|(term, &tf)| {
                        let w = tf as f64 * self.idf(term);
                        w * w
                    })
                    .sum::<f64>()
                    .sqrt()
            })
            .collect();
    }
}

/// Split page text into sentence-grouped chunks of about [`CHUNK_TARGET`] bytes.
pub fn chunk_pages(pages: &[PageText]) -> Vec<(Option<u32>, String)> {
    let mut chunks = Vec::new();
    for page in pages {
        let text = collapse_whitespace(&page.text);
        if text.is_empty() {
            continue;
        }

        let mut page_chunks: Vec<String> = Vec::new();
        let mut current = String::new();
        for sentence in split_sentences(&text) {
            if !current.is_empty() && current.len() + sentence.len() + 1 > CHUNK_TARGET {
                page_chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
        }
        if !current.is_empty() {
            page_chunks.push(current);
        }

        let has_long = page_chunks.iter().any(|c| c.len() >= CHUNK_MIN);
        chunks.extend(
            page_chunks
                .into_iter()
                .filter(|c| !has_long || c.len() >= CHUNK_MIN)
                .map(|c| (page.page, c)),
        );
    }
    chunks
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') && matches!(chars.peek(), Some((_, ' '))) {
            let end = i + c.len_utf8();
            sentences.push(text[start..end].trim());
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences.retain(|s| !s.is_empty());
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(works: &[(&str, &str)]) -> SourceIndex {
        let mut index = SourceIndex::new();
        for (id, text) in works {
            index.add_work(&WorkId::new(*id), &[PageText::new(1, *text)]);
        }
        index
    }

    #[test]
    fn test_search_before_indexing_fails() {
        let index = SourceIndex::new();
        assert!(matches!(index.search("carbon", 5), Err(LibraryError::NotIndexed)));
    }

    #[test]
    fn test_short_page_is_kept() {
        let index = index_with(&[("w1", "Trees sequester carbon at rate X")]);
        assert_eq!(index.len(), 1);

        let results = index.search("Trees absorb carbon dioxide.", 5).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].1 > 0.2 && results[0].1 <= 1.0);
        assert_eq!(results[0].0.page, Some(1));
    }

    #[test]
    fn test_search_ranks_by_similarity() {
        let index = index_with(&[
            ("w1", "Ocean temperatures have risen steadily over the last century."),
            ("w2", "Boreal forests sequester carbon and store carbon in peat soils."),
            ("w3", "Urban planning shapes commuting behaviour in large cities."),
        ]);
        let results = index.search("forests store carbon", 10).unwrap();
        assert_eq!(results[0].0.work_id, WorkId::new("w2"));
        assert!(results.iter().all(|(p, _)| p.work_id != WorkId::new("w3")));
        assert!(results.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_ties_break_by_work_id() {
        let index = index_with(&[
            ("w2", "Carbon storage in wetlands is substantial overall."),
            ("w1", "Carbon storage in wetlands is substantial overall."),
        ]);
        let results = index.search("carbon wetlands", 10).unwrap();
        assert_eq!(results[0].0.work_id, WorkId::new("w1"));
        assert_eq!(results[1].0.work_id, WorkId::new("w2"));
    }

    #[test]
    fn test_readding_replaces_passages() {
        let mut index = index_with(&[("w1", "Carbon sinks in forests are important for climate.")]);
        index.add_work(&WorkId::new("w1"), &[PageText::new(2, "Ocean heat content keeps increasing every year.")]);
        assert_eq!(index.len(), 1);
        assert!(index.search("carbon forests", 5).unwrap().is_empty());

        assert!(index.remove_work(&WorkId::new("w1")));
        assert!(index.is_empty());
    }

    #[test]
    fn test_chunking_groups_sentences() {
        let sentence = "This sentence about carbon sequestration in boreal forests is long enough. ";
        let page = PageText::new(3, sentence.repeat(20));
        let chunks = chunk_pages(&[page, PageText::new(4, "Tiny.")]);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|(_, c)| c.len() <= CHUNK_TARGET));
        assert!(chunks.iter().any(|(p, _)| *p == Some(3)));
        // A page with only short text keeps it
        assert!(chunks.iter().any(|(p, c)| *p == Some(4) && c == "Tiny."));
    }

    #[test]
    fn test_serde_rebuilds_statistics() {
        let index = index_with(&[("w1", "Boreal forests sequester carbon in peat soils.")]);
        let json = serde_json::to_string(&index).unwrap();
        let restored: SourceIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(
            restored.search("carbon", 1).unwrap()[0].1,
            index.search("carbon", 1).unwrap()[0].1
        );
        assert_eq!(restored.stats().works, 1);
    }
}
