//! Deduplication utilities for works and retrieval candidates.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use strsim::jaro_winkler;

use crate::models::{Candidate, Work};
use crate::utils::text::{normalize_doi, normalize_title, tokenize};

/// Minimum title similarity for two works to count as likely duplicates
pub const TITLE_SIMILARITY_THRESHOLD: f64 = 0.95;

/// Minimum word overlap for a free-text title to match a library entry
pub const WORD_OVERLAP_THRESHOLD: f64 = 0.6;

/// Ordering used everywhere candidates are ranked: relevance desc, lexical
/// desc, then work id and passage ordinal ascending.
pub fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.relevance_score
        .total_cmp(&a.relevance_score)
        .then_with(|| b.lexical_score.total_cmp(&a.lexical_score))
        .then_with(|| a.work_id.cmp(&b.work_id))
        .then_with(|| a.passage.ordinal.cmp(&b.passage.ordinal))
}

/// Keep only the best-ranked candidate per work, preserving rank order
pub fn best_per_work(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(compare_candidates);
    let mut seen = HashSet::new();
    candidates.retain(|c| seen.insert(c.work_id.clone()));
    candidates
}

/// Jaccard overlap of the content words of two strings, in `[0, 1]`
pub fn word_overlap(a: &str, b: &str) -> f64 {
    let words_a: HashSet<String> = tokenize(a).into_iter().collect();
    let words_b: HashSet<String> = tokenize(b).into_iter().collect();
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    intersection as f64 / union as f64
}

/// Jaro-Winkler similarity of two normalized titles
pub fn title_similarity(a: &str, b: &str) -> f64 {
    jaro_winkler(&normalize_title(a), &normalize_title(b))
}

/// Check if two works are likely the same publication
pub fn are_duplicates(a: &Work, b: &Work) -> bool {
    // DOI match is the strongest signal
    if let (Some(doi_a), Some(doi_b)) = (&a.doi, &b.doi) {
        if normalize_doi(doi_a) == normalize_doi(doi_b) {
            return true;
        }
    }

    if a.year.is_some() && b.year.is_some() && a.year != b.year {
        return false;
    }

    title_similarity(&a.title, &b.title) >= TITLE_SIMILARITY_THRESHOLD && authors_match(a, b)
}

/// Check if at least one surname is shared (true if either list is empty)
fn authors_match(a: &Work, b: &Work) -> bool {
    let surnames_a: HashSet<String> = a.authors.iter().map(|x| x.family.to_lowercase()).collect();
    let surnames_b: HashSet<String> = b.authors.iter().map(|x| x.family.to_lowercase()).collect();

    if surnames_a.is_empty() || surnames_b.is_empty() {
        return true;
    }

    surnames_a.intersection(&surnames_b).count() > 0
}

/// Find groups of likely-duplicate works.
///
/// Returns groups of indices; works without a duplicate are not listed.
pub fn find_duplicates(works: &[Work]) -> Vec<Vec<usize>> {
    // Bucket by first title token to avoid comparing every pair
    let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, work) in works.iter().enumerate() {
        let key = normalize_title(&work.title)
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        buckets.entry(key).or_default().push(i);
    }

    let mut processed: HashSet<usize> = HashSet::new();
    let mut groups = Vec::new();
    let mut keys: Vec<&String> = buckets.keys().collect();
    keys.sort();

    for key in keys {
        let members = &buckets[key];
        for (pos, &i) in members.iter().enumerate() {
            if processed.contains(&i) {
                continue;
            }
            let mut group = vec![i];
            for &j in members.iter().skip(pos + 1) {
                if !processed.contains(&j) && are_duplicates(&works[i], &works[j]) {
                    group.push(j);
                    processed.insert(j);
                }
            }
            processed.insert(i);
            if group.len() > 1 {
                groups.push(group);
            }
        }
    }

    groups.sort();
    groups
}

/// Find the work whose title best matches `title` by word overlap.
///
/// Returns `None` unless the best overlap reaches [`WORD_OVERLAP_THRESHOLD`].
pub fn find_matching_work<'a>(title: &str, works: impl IntoIterator<Item = &'a Work>) -> Option<&'a Work> {
    works
        .into_iter()
        .map(|w| (word_overlap(title, &w.title), w))
        .filter(|(score, _)| *score >= WORD_OVERLAP_THRESHOLD)
        .max_by(|(sa, wa), (sb, wb)| sa.total_cmp(sb).then_with(|| wb.work_id.cmp(&wa.work_id)))
        .map(|(_, w)| w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Author, Passage, Span, WorkId, WorkKind};

    fn work(id: &str, title: &str, year: Option<i32>, author: &str) -> Work {
        Work {
            work_id: WorkId::new(id),
            authors: vec![Author::new(author, None)],
            title: title.to_string(),
            year,
            container: None,
            publisher: None,
            volume: None,
            issue: None,
            pages: None,
            doi: None,
            isbn: None,
            url: None,
            kind: WorkKind::Other,
        }
    }

    fn candidate(work_id: &str, ordinal: usize, relevance: f64) -> Candidate {
        Candidate {
            claim: Span::new(0, 10),
            work_id: WorkId::new(work_id),
            passage: Passage {
                work_id: WorkId::new(work_id),
                ordinal,
                page: None,
                text: String::new(),
                normalized: String::new(),
            },
            lexical_score: 0.5,
            relevance_score: relevance,
            confidence: relevance,
            degraded: false,
        }
    }

    #[test]
    fn test_best_per_work() {
        let kept = best_per_work(vec![
            candidate("w1", 0, 0.4),
            candidate("w2", 0, 0.9),
            candidate("w1", 3, 0.8),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].work_id.as_str(), "w2");
        assert_eq!(kept[1].work_id.as_str(), "w1");
        assert_eq!(kept[1].passage.ordinal, 3);
    }

    #[test]
    fn test_ties_break_by_work_id() {
        let kept = best_per_work(vec![candidate("wb", 0, 0.5), candidate("wa", 0, 0.5)]);
        assert_eq!(kept[0].work_id.as_str(), "wa");
    }

    #[test]
    fn test_word_overlap() {
        assert_eq!(word_overlap("forest carbon", "Forest Carbon"), 1.0);
        assert_eq!(word_overlap("forest", ""), 0.0);
        assert!((word_overlap("forest carbon sinks", "forest carbon") - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_duplicates_by_doi() {
        let mut a = work("w1", "One", Some(2020), "Smith");
        let mut b = work("w2", "Completely different", Some(2021), "Jones");
        a.doi = Some("10.1/ABC".to_string());
        b.doi = Some("https://doi.org/10.1/abc".to_string());
        assert!(are_duplicates(&a, &b));
    }

    #[test]
    fn test_different_year_not_duplicate() {
        let a = work("w1", "Forest carbon sinks", Some(2020), "Smith");
        let b = work("w2", "Forest carbon sinks", Some(2021), "Smith");
        assert!(!are_duplicates(&a, &b));
    }

    #[test]
    fn test_find_duplicates() {
        let works = vec![
            work("w1", "Forest carbon sinks", Some(2020), "Smith"),
            work("w2", "Ocean warming", Some(2019), "Lee"),
            work("w3", "Forest Carbon Sinks.", None, "Smith"),
        ];
        assert_eq!(find_duplicates(&works), vec![vec![0, 2]]);
    }

    #[test]
    fn test_find_matching_work() {
        let works = vec![
            work("w1", "Forest carbon sinks in boreal regions", Some(2020), "Smith"),
            work("w2", "Ocean warming", Some(2019), "Lee"),
        ];
        let found = find_matching_work("Carbon sinks in boreal forest regions", &works);
        assert_eq!(found.map(|w| w.work_id.as_str()), Some("w1"));
        assert!(find_matching_work("Unrelated topic", &works).is_none());
    }
}
