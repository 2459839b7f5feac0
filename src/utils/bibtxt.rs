//! Bibliography import: Zotero/APA plain-text exports and JSON record arrays.
//!
//! A plain-text export holds one formatted reference per paragraph:
//!
//! ```text
//! Smith, J. A., & Jones, B. (2020). Forest carbon sinks. Nature, 12(3), 45-67. https://doi.org/10.1000/xyz
//! ```

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

use crate::models::{RawMetadata, WorkKind};
use crate::utils::pdf::extract_doi;
use crate::utils::text::collapse_whitespace;

/// Errors from bibliography import
#[derive(Debug, Error)]
pub enum BibliographyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No bibliography entries found")]
    Empty,
}

/// Load records from a `.json` array of raw metadata or a plain-text export
pub fn load_bibliography(path: &Path) -> Result<Vec<RawMetadata>, BibliographyError> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let records = if is_json {
        parse_json_records(&content)?
    } else {
        parse_plain_text(&content)
    };

    if records.is_empty() {
        return Err(BibliographyError::Empty);
    }
    tracing::info!(path = %path.display(), entries = records.len(), "parsed bibliography");
    Ok(records)
}

/// Parse a JSON array of [`RawMetadata`]
pub fn parse_json_records(content: &str) -> Result<Vec<RawMetadata>, BibliographyError> {
    serde_json::from_str(content).map_err(|e| BibliographyError::Parse(e.to_string()))
}

/// Parse a plain-text export; entries without a recognisable title are skipped
pub fn parse_plain_text(content: &str) -> Vec<RawMetadata> {
    let normalized = content.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .map(collapse_whitespace)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let parsed = parse_entry(&entry);
            if parsed.is_none() {
                tracing::debug!(entry = %entry, "skipping unparseable bibliography entry");
            }
            parsed
        })
        .collect()
}

fn regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn year_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    regex(&RE, r"\((\d{4})[a-z]?\)|\((n\.d\.)\)")
}

fn url_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    regex(&RE, r"https?://\S+")
}

fn journal_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    regex(
        &RE,
        r"^([^,]+),\s*(\d+)(?:\(([^)]+)\))?(?:,\s*([A-Za-z]?\d+(?:\s*[-–]\s*[A-Za-z]?\d+)?))?",
    )
}

/// Parse one formatted reference
pub fn parse_entry(entry: &str) -> Option<RawMetadata> {
    let mut raw = RawMetadata::default();

    let doi = extract_doi(entry);
    let url = url_re()
        .and_then(|re| re.find(entry))
        .map(|m| m.as_str().trim_end_matches(['.', ',']).to_string())
        .filter(|u| !u.contains("doi.org/"));

    // Author-date layout: "<authors> (<year>). <title>. <source>."
    let (head, tail) = match year_re().and_then(|re| re.captures(entry)) {
        Some(caps) => {
            let whole = caps.get(0)?;
            raw.year = caps.get(1).or(caps.get(2)).map(|m| m.as_str().to_string());
            let tail = entry[whole.end()..].trim_start_matches(['.', ' ']);
            (&entry[..whole.start()], tail)
        }
        None => ("", entry),
    };

    raw.authors = split_authors(head);
    let (title, rest) = split_title(tail);
    if title.chars().filter(|c| c.is_alphanumeric()).count() < 3 {
        return None;
    }
    raw.title = title;

    let source = strip_links(rest);
    let source = source.trim().trim_end_matches('.').trim();
    if let Some(caps) = journal_re().and_then(|re| re.captures(source)) {
        raw.container = caps.get(1).map(|m| m.as_str().trim().to_string());
        raw.volume = caps.get(2).map(|m| m.as_str().to_string());
        raw.issue = caps.get(3).map(|m| m.as_str().to_string());
        raw.pages = caps.get(4).map(|m| m.as_str().replace(' ', ""));
        raw.kind = Some(WorkKind::Journal);
    } else if !source.is_empty() {
        let lower = source.to_lowercase();
        if lower.contains("journal") || lower.contains("proceedings") {
            raw.container = Some(source.to_string());
            raw.kind = Some(WorkKind::Journal);
        } else {
            raw.publisher = Some(source.to_string());
            raw.kind = Some(WorkKind::Book);
        }
    } else {
        raw.kind = Some(WorkKind::Other);
    }

    raw.doi = doi;
    raw.url = url;
    Some(raw)
}

/// Title runs to the first sentence end; a terminal `?` or `!` is kept
fn split_title(text: &str) -> (String, &str) {
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let at_boundary = matches!(chars.peek(), None | Some((_, ' ')));
        if at_boundary && matches!(c, '.' | '?' | '!') {
            let end = if c == '.' { i } else { i + c.len_utf8() };
            return (text[..end].trim().to_string(), &text[i + c.len_utf8()..]);
        }
    }
    (text.trim().to_string(), "")
}

fn strip_links(text: &str) -> String {
    let without_urls = match url_re() {
        Some(re) => re.replace_all(text, "").to_string(),
        None => text.to_string(),
    };
    let lower = without_urls.to_lowercase();
    match lower.find("doi:") {
        Some(pos) => without_urls[..pos].to_string(),
        None => without_urls,
    }
}

fn is_initials(token: &str) -> bool {
    let token = token.trim();
    !token.is_empty()
        && token.contains('.')
        && token
            .split(['.', ' ', '-'])
            .filter(|p| !p.is_empty())
            .all(|p| p.chars().count() == 1 && p.chars().all(char::is_uppercase))
}

/// Split "Smith, J. A., Jones, B., & Lee, C." into "Family, Initials" strings
pub fn split_authors(text: &str) -> Vec<String> {
    let cleaned = text
        .replace(", &", ",")
        .replace(" & ", ", ")
        .replace(", and ", ", ")
        .replace(" and ", ", ")
        .replace("...", ",")
        .replace(". . .", ",");

    let mut authors: Vec<String> = Vec::new();
    let mut pending_family: Option<String> = None;
    for token in cleaned.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if is_initials(token) {
            match pending_family.take() {
                Some(family) => authors.push(format!("{}, {}", family, token)),
                None => {
                    if let Some(last) = authors.last_mut() {
                        last.push(' ');
                        last.push_str(token);
                    }
                }
            }
        } else if let Some(family) = pending_family.replace(token.to_string()) {
            authors.push(family);
        }
    }
    authors.extend(pending_family);
    authors.truncate(50);
    authors
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const EXPORT: &str = "Smith, J. A., & Jones, B. (2020). Forest carbon sinks. Nature, 12(3), 45-67. https://doi.org/10.1038/nature123\n\n\
Lee, C. (2018). Climate policy in practice. Oxford University Press.\n\n\
??\n";

    #[test]
    fn test_parse_journal_entry() {
        let records = parse_plain_text(EXPORT);
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.authors, vec!["Smith, J. A.", "Jones, B."]);
        assert_eq!(first.year.as_deref(), Some("2020"));
        assert_eq!(first.title, "Forest carbon sinks");
        assert_eq!(first.container.as_deref(), Some("Nature"));
        assert_eq!(first.volume.as_deref(), Some("12"));
        assert_eq!(first.issue.as_deref(), Some("3"));
        assert_eq!(first.pages.as_deref(), Some("45-67"));
        assert_eq!(first.doi.as_deref(), Some("10.1038/nature123"));
        assert_eq!(first.url, None);
        assert_eq!(first.kind, Some(WorkKind::Journal));
    }

    #[test]
    fn test_parse_book_entry() {
        let records = parse_plain_text(EXPORT);
        let book = &records[1];
        assert_eq!(book.authors, vec!["Lee, C."]);
        assert_eq!(book.title, "Climate policy in practice");
        assert_eq!(book.publisher.as_deref(), Some("Oxford University Press"));
        assert_eq!(book.kind, Some(WorkKind::Book));
    }

    #[test]
    fn test_question_title_and_no_date() {
        let raw = parse_entry("Doe, A. (n.d.). Do forests matter? Retrieved from https://example.org/x").unwrap();
        assert_eq!(raw.title, "Do forests matter?");
        assert_eq!(raw.year.as_deref(), Some("n.d."));
        assert_eq!(raw.url.as_deref(), Some("https://example.org/x"));
    }

    #[test]
    fn test_split_authors() {
        assert_eq!(
            split_authors("Smith, J. A., Jones, B., & Lee, C.-P. "),
            vec!["Smith, J. A.", "Jones, B.", "Lee, C.-P."]
        );
        assert_eq!(split_authors("World Health Organization"), vec!["World Health Organization"]);
        assert!(split_authors("").is_empty());
    }

    #[test]
    fn test_load_json_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("refs.json");
        std::fs::write(&path, r#"[{"title": "A study", "authors": ["Smith, J."], "year": "2020"}]"#).unwrap();

        let records = load_bibliography(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "A study");
    }

    #[test]
    fn test_load_empty_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("refs.txt");
        std::fs::write(&path, "\n\n").unwrap();
        assert!(matches!(load_bibliography(&path), Err(BibliographyError::Empty)));
    }
}
