//! Bibliography resolution: raw records to canonical works.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::LibraryError;
use crate::models::{Author, RawMetadata, Work, WorkId, WorkKind};
use crate::utils::find_matching_work;
use crate::utils::text::{collapse_whitespace, normalize_doi, normalize_isbn, normalize_title};

/// Earliest year accepted from metadata
const MIN_YEAR: i32 = 1500;

/// Latest year accepted from metadata. Fixed so that a forthcoming year
/// yields the same work id whenever the record is imported.
const MAX_YEAR: i32 = 2100;

/// Outcome of resolving one raw record
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub work: Work,
    /// `true` when a new work was created, `false` when merged into an existing one
    pub created: bool,
}

/// Owns the canonical set of works.
///
/// Two records resolve to the same work iff their normalized title, year and
/// first-author surname all match. Display forms are kept as imported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BibliographyResolver {
    works: BTreeMap<WorkId, Work>,
}

impl BibliographyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a raw record into a canonical work, merging with an existing
    /// work that has the same identity.
    pub fn resolve(&mut self, raw: RawMetadata) -> Result<Work, LibraryError> {
        self.resolve_detailed(raw).map(|r| r.work)
    }

    /// Like [`resolve`](Self::resolve), also reporting whether a work was created
    pub fn resolve_detailed(&mut self, raw: RawMetadata) -> Result<Resolved, LibraryError> {
        let incoming = canonicalize(&raw)?;
        // Records without a title have no identity key; an identifier is all
        // they can be matched on
        let identityless = normalize_title(&incoming.title).is_empty();

        let mut matches: Vec<WorkId> = Vec::new();
        if self.works.contains_key(&incoming.work_id) {
            matches.push(incoming.work_id.clone());
        }
        for existing in self.works.values() {
            if shares_identifier(existing, &incoming) && !matches.contains(&existing.work_id) {
                matches.push(existing.work_id.clone());
            }
        }

        match matches.as_slice() {
            [] => {
                tracing::debug!(work_id = %incoming.work_id, title = %incoming.title, "new work");
                self.works.insert(incoming.work_id.clone(), incoming.clone());
                Ok(Resolved {
                    work: incoming,
                    created: true,
                })
            }
            [only] if *only == incoming.work_id || identityless => {
                let merged = match self.works.get(only) {
                    Some(existing) => merge(existing, &incoming),
                    None => incoming,
                };
                self.works.insert(merged.work_id.clone(), merged.clone());
                Ok(Resolved {
                    work: merged,
                    created: false,
                })
            }
            _ => {
                // The record shares an identifier with a work of a different
                // identity; merging would leave two indistinguishable works.
                let mut work_ids = matches;
                if !work_ids.contains(&incoming.work_id) {
                    work_ids.push(incoming.work_id.clone());
                }
                work_ids.sort();
                tracing::warn!(title = %incoming.title, ?work_ids, "ambiguous metadata, not merged");
                Err(LibraryError::AmbiguousMetadata { work_ids })
            }
        }
    }

    pub fn get(&self, work_id: &WorkId) -> Option<&Work> {
        self.works.get(work_id)
    }

    pub fn contains(&self, work_id: &WorkId) -> bool {
        self.works.contains_key(work_id)
    }

    /// All works, ordered by work id
    pub fn works(&self) -> impl Iterator<Item = &Work> {
        self.works.values()
    }

    pub fn len(&self) -> usize {
        self.works.len()
    }

    pub fn is_empty(&self) -> bool {
        self.works.is_empty()
    }

    pub(crate) fn remove(&mut self, work_id: &WorkId) -> Option<Work> {
        self.works.remove(work_id)
    }

    /// Find the work a PDF belongs to, by exact title, title word overlap,
    /// then author surname.
    pub fn find_match(&self, title: &str, author: Option<&str>) -> Option<&Work> {
        let wanted = normalize_title(title);
        if !wanted.is_empty() {
            if let Some(work) = self
                .works
                .values()
                .find(|w| normalize_title(&w.title) == wanted)
            {
                return Some(work);
            }
            if let Some(work) = find_matching_work(title, self.works.values()) {
                return Some(work);
            }
        }

        let surname = author
            .and_then(Author::parse)
            .map(|a| a.family.to_lowercase())
            .filter(|s| s.chars().count() > 2)?;
        let mut by_author = self.works.values().filter(|w| {
            w.first_author_surname()
                .is_some_and(|s| s.to_lowercase() == surname)
        });
        // Only an unambiguous author match counts
        match (by_author.next(), by_author.next()) {
            (Some(work), None) => Some(work),
            _ => None,
        }
    }
}

fn shares_identifier(a: &Work, b: &Work) -> bool {
    let same_doi = matches!((&a.doi, &b.doi), (Some(x), Some(y)) if x == y);
    let same_isbn = matches!((&a.isbn, &b.isbn), (Some(x), Some(y)) if x == y);
    same_doi || same_isbn
}

/// Normalize a raw record into a work with its stable id
pub fn canonicalize(raw: &RawMetadata) -> Result<Work, LibraryError> {
    let title = collapse_whitespace(raw.title.trim())
        .trim_end_matches('.')
        .trim()
        .to_string();
    let authors: Vec<Author> = raw
        .authors
        .iter()
        .filter_map(|a| Author::parse(a))
        .map(|a| a.normalized())
        .collect();
    let year = raw.year.as_deref().and_then(extract_year);
    let doi = non_empty(raw.doi.as_deref())
        .map(normalize_doi)
        .filter(|d| d.starts_with("10."));
    let isbn = non_empty(raw.isbn.as_deref())
        .map(normalize_isbn)
        .filter(|i| i.len() == 10 || i.len() == 13);

    if title.is_empty() && doi.is_none() && isbn.is_none() {
        return Err(LibraryError::InvalidRecord(
            "record has neither a title nor an identifier".to_string(),
        ));
    }

    let container = non_empty(raw.container.as_deref()).map(collapse_whitespace);
    let publisher = non_empty(raw.publisher.as_deref()).map(collapse_whitespace);
    let kind = raw.kind.unwrap_or(if container.is_some() {
        WorkKind::Journal
    } else if publisher.is_some() && isbn.is_some() {
        WorkKind::Book
    } else {
        WorkKind::Other
    });

    let work_id = work_id_for(&title, year, authors.first(), doi.as_deref(), isbn.as_deref());

    Ok(Work {
        work_id,
        authors,
        title,
        year,
        container,
        publisher,
        volume: non_empty(raw.volume.as_deref()).map(String::from),
        issue: non_empty(raw.issue.as_deref()).map(String::from),
        pages: non_empty(raw.pages.as_deref()).map(String::from),
        doi,
        isbn,
        url: non_empty(raw.url.as_deref()).map(String::from),
        kind,
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Identity key: normalized title, year and first-author surname
pub fn identity_key(title: &str, year: Option<i32>, first_author: Option<&Author>) -> String {
    let surname = first_author
        .map(|a| normalize_title(&a.family))
        .unwrap_or_default();
    let year = year.map(|y| y.to_string()).unwrap_or_default();
    format!("{}|{}|{}", normalize_title(title), year, surname)
}

fn work_id_for(
    title: &str,
    year: Option<i32>,
    first_author: Option<&Author>,
    doi: Option<&str>,
    isbn: Option<&str>,
) -> WorkId {
    let key = if normalize_title(title).is_empty() {
        match (doi, isbn) {
            (Some(doi), _) => format!("doi:{}", doi),
            (None, Some(isbn)) => format!("isbn:{}", isbn),
            (None, None) => identity_key(title, year, first_author),
        }
    } else {
        identity_key(title, year, first_author)
    };

    let digest = Sha256::digest(key.as_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    WorkId::new(format!("w{}", hex))
}

/// First plausible four-digit year in a free-text date
pub fn extract_year(text: &str) -> Option<i32> {
    let bytes = text.as_bytes();
    (0..bytes.len().saturating_sub(3))
        .filter(|&i| bytes[i..i + 4].iter().all(u8::is_ascii_digit))
        .filter(|&i| i == 0 || !bytes[i - 1].is_ascii_digit())
        .filter(|&i| i + 4 == bytes.len() || !bytes[i + 4].is_ascii_digit())
        .filter_map(|i| text.get(i..i + 4)?.parse::<i32>().ok())
        .find(|y| (MIN_YEAR..=MAX_YEAR).contains(y))
}

/// Merge two records of the same identity: the more complete one wins,
/// fields missing from the winner are taken from the other.
fn merge(existing: &Work, incoming: &Work) -> Work {
    let (winner, other) = if incoming.completeness() > existing.completeness() {
        (incoming, existing)
    } else {
        (existing, incoming)
    };

    let pick = |a: &Option<String>, b: &Option<String>| a.clone().or_else(|| b.clone());
    Work {
        work_id: existing.work_id.clone(),
        authors: if winner.authors.is_empty() {
            other.authors.clone()
        } else {
            winner.authors.clone()
        },
        title: if winner.title.is_empty() {
            other.title.clone()
        } else {
            winner.title.clone()
        },
        year: winner.year.or(other.year),
        container: pick(&winner.container, &other.container),
        publisher: pick(&winner.publisher, &other.publisher),
        volume: pick(&winner.volume, &other.volume),
        issue: pick(&winner.issue, &other.issue),
        pages: pick(&winner.pages, &other.pages),
        doi: pick(&winner.doi, &other.doi),
        isbn: pick(&winner.isbn, &other.isbn),
        url: pick(&winner.url, &other.url),
        kind: if winner.kind == WorkKind::Other {
            other.kind
        } else {
            winner.kind
        },
    }
}
