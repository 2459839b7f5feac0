//! Work model representing a canonical bibliographic source.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::text::{normalize_name_case, NAME_PARTICLES};

/// Stable identifier of a [`Work`] within a library
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(String);

impl WorkId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of publication a work is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkKind {
    Journal,
    Book,
    #[default]
    Other,
}

/// A single author, split into family and given names
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Author {
    /// Family name (surname), including particles such as "van der"
    pub family: String,

    /// Given names, if known
    pub given: Option<String>,
}

impl Author {
    /// Create an author from its parts
    pub fn new(family: impl Into<String>, given: Option<&str>) -> Self {
        Self {
            family: family.into(),
            given: given
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty()),
        }
    }

    /// Parse "Family, Given", "Given Family", "Family G." or a bare surname.
    ///
    /// Parenthesised affiliations and e-mail addresses are removed first.
    /// Returns `None` when nothing name-like remains.
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned = strip_affiliations(raw);
        let cleaned = cleaned.trim().trim_end_matches(',').trim();
        if cleaned.is_empty() {
            return None;
        }

        if let Some((family, given)) = cleaned.split_once(',') {
            let family = family.trim();
            if family.is_empty() {
                return None;
            }
            return Some(Self::new(family, Some(given)));
        }

        let words: Vec<&str> = cleaned.split_whitespace().collect();
        match words.len() {
            0 => None,
            1 => Some(Self::new(words[0], None)),
            _ => {
                // "Smith JA" / "Smith J. A." (Vancouver-style initials after the surname)
                let trailing_initials = words[1..].iter().all(|w| looks_like_initials(w));
                if trailing_initials && !looks_like_initials(words[0]) {
                    return Some(Self::new(words[0], Some(&words[1..].join(" "))));
                }

                let mut family_start = words.len() - 1;
                while family_start > 1
                    && NAME_PARTICLES.contains(&words[family_start - 1].to_lowercase().as_str())
                {
                    family_start -= 1;
                }
                let family = words[family_start..].join(" ");
                let given = words[..family_start].join(" ");
                Some(Self::new(family, Some(&given)))
            }
        }
    }

    /// Returns a copy with ALL-CAPS or all-lowercase name parts title-cased.
    pub fn normalized(&self) -> Self {
        Self {
            family: normalize_person_name(&self.family),
            given: self.given.as_deref().map(normalize_person_name),
        }
    }

    /// Initials of the given names, e.g. "J. A." or "J.-P."
    pub fn initials(&self) -> String {
        let Some(given) = self.given.as_deref() else {
            return String::new();
        };

        given
            .split(|c: char| c.is_whitespace() || c == '.')
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.split('-')
                    .filter_map(|p| p.chars().next())
                    .map(|c| format!("{}.", c.to_uppercase()))
                    .collect::<Vec<_>>()
                    .join("-")
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// "Family, Given" (or just "Family")
    pub fn family_first(&self) -> String {
        match &self.given {
            Some(given) => format!("{}, {}", self.family, given),
            None => self.family.clone(),
        }
    }

    /// "Given Family" (or just "Family")
    pub fn given_first(&self) -> String {
        match &self.given {
            Some(given) => format!("{} {}", given, self.family),
            None => self.family.clone(),
        }
    }
}

fn strip_affiliations(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '(' | '<' => depth += 1,
            ')' | '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace()
        .filter(|w| !w.contains('@'))
        .collect::<Vec<_>>()
        .join(" ")
}

fn looks_like_initials(word: &str) -> bool {
    let letters: Vec<char> = word.chars().filter(|c| c.is_alphabetic()).collect();
    !letters.is_empty()
        && letters.len() <= 3
        && letters.iter().all(|c| c.is_uppercase())
        && word.chars().all(|c| c.is_alphabetic() || c == '.' || c == '-')
}

fn normalize_person_name(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            if NAME_PARTICLES.contains(&word.to_lowercase().as_str()) {
                word.to_lowercase()
            } else {
                normalize_name_case(word)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Loosely structured metadata from PDF extraction or a bibliography import
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetadata {
    /// Title as found in the source
    #[serde(default)]
    pub title: String,

    /// Author strings in source order
    #[serde(default)]
    pub authors: Vec<String>,

    /// Year or a date string containing it
    #[serde(default)]
    pub year: Option<String>,

    /// Journal, proceedings or other venue
    #[serde(default)]
    pub container: Option<String>,

    #[serde(default)]
    pub publisher: Option<String>,

    #[serde(default)]
    pub volume: Option<String>,

    #[serde(default)]
    pub issue: Option<String>,

    #[serde(default)]
    pub pages: Option<String>,

    #[serde(default)]
    pub doi: Option<String>,

    #[serde(default)]
    pub isbn: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub kind: Option<WorkKind>,

    /// File the record was extracted from, if any
    #[serde(default)]
    pub source_file: Option<String>,
}

/// Builder for constructing [`RawMetadata`] records
#[derive(Debug, Clone, Default)]
pub struct MetadataBuilder {
    raw: RawMetadata,
}

impl MetadataBuilder {
    /// Create a new builder with a title
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            raw: RawMetadata {
                title: title.into(),
                ..Default::default()
            },
        }
    }

    /// Append an author
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.raw.authors.push(author.into());
        self
    }

    /// Set year (or any date string containing it)
    pub fn year(mut self, year: impl Into<String>) -> Self {
        self.raw.year = Some(year.into());
        self
    }

    /// Set container / venue
    pub fn container(mut self, container: impl Into<String>) -> Self {
        self.raw.container = Some(container.into());
        self
    }

    /// Set publisher
    pub fn publisher(mut self, publisher: impl Into<String>) -> Self {
        self.raw.publisher = Some(publisher.into());
        self
    }

    /// Set volume, issue and pages
    pub fn volume_issue_pages(
        mut self,
        volume: Option<&str>,
        issue: Option<&str>,
        pages: Option<&str>,
    ) -> Self {
        self.raw.volume = volume.map(String::from);
        self.raw.issue = issue.map(String::from);
        self.raw.pages = pages.map(String::from);
        self
    }

    /// Set DOI
    pub fn doi(mut self, doi: impl Into<String>) -> Self {
        self.raw.doi = Some(doi.into());
        self
    }

    /// Set ISBN
    pub fn isbn(mut self, isbn: impl Into<String>) -> Self {
        self.raw.isbn = Some(isbn.into());
        self
    }

    /// Set URL
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.raw.url = Some(url.into());
        self
    }

    /// Set publication kind
    pub fn kind(mut self, kind: WorkKind) -> Self {
        self.raw.kind = Some(kind);
        self
    }

    /// Set originating file name
    pub fn source_file(mut self, file: impl Into<String>) -> Self {
        self.raw.source_file = Some(file.into());
        self
    }

    /// Build the record
    pub fn build(self) -> RawMetadata {
        self.raw
    }
}

/// A canonical bibliographic source.
///
/// Works are created by the bibliography resolver; `work_id` stays the same
/// across re-imports of the same underlying record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub work_id: WorkId,
    pub authors: Vec<Author>,
    /// Display title (original casing and punctuation)
    pub title: String,
    pub year: Option<i32>,
    pub container: Option<String>,
    pub publisher: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    pub doi: Option<String>,
    pub isbn: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub kind: WorkKind,
}

impl Work {
    /// Surname of the first author, if any
    pub fn first_author_surname(&self) -> Option<&str> {
        self.authors.first().map(|a| a.family.as_str())
    }

    /// Number of populated bibliographic fields (used to pick a merge winner)
    pub fn completeness(&self) -> usize {
        let optional = [
            &self.container,
            &self.publisher,
            &self.volume,
            &self.issue,
            &self.pages,
            &self.doi,
            &self.isbn,
            &self.url,
        ];
        usize::from(!self.title.is_empty())
            + usize::from(!self.authors.is_empty())
            + usize::from(self.year.is_some())
            + optional.iter().filter(|f| f.is_some()).count()
    }

    /// Convert back into a raw record that resolves to the same work.
    pub fn to_raw(&self) -> RawMetadata {
        RawMetadata {
            title: self.title.clone(),
            authors: self.authors.iter().map(Author::family_first).collect(),
            year: self.year.map(|y| y.to_string()),
            container: self.container.clone(),
            publisher: self.publisher.clone(),
            volume: self.volume.clone(),
            issue: self.issue.clone(),
            pages: self.pages.clone(),
            doi: self.doi.clone(),
            isbn: self.isbn.clone(),
            url: self.url.clone(),
            kind: Some(self.kind),
            source_file: None,
        }
    }
}

/// Text of one extracted PDF page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number, `None` when page boundaries are unknown
    pub page: Option<u32>,
    pub text: String,
}

impl PageText {
    pub fn new(page: u32, text: impl Into<String>) -> Self {
        Self {
            page: Some(page),
            text: text.into(),
        }
    }

    /// Text whose page boundaries are unknown (plain-text sources, fallback extraction)
    pub fn unnumbered(text: impl Into<String>) -> Self {
        Self {
            page: None,
            text: text.into(),
        }
    }
}

/// An extracted span of source text belonging to a work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub work_id: WorkId,
    /// Position of the passage within its work
    pub ordinal: usize,
    /// Page the passage was taken from
    pub page: Option<u32>,
    pub text: String,
    /// Lowercased, stopword-free token string used for matching
    pub normalized: String,
}

impl Passage {
    /// Page locator suitable for an in-text citation
    pub fn locator(&self) -> Option<String> {
        self.page.map(|p| p.to_string())
    }
}
