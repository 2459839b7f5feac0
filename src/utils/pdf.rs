//! PDF text and metadata extraction.
//!
//! Pages are extracted one at a time with lopdf so that passages keep their
//! page numbers. When lopdf cannot read the document (or finds no text), the
//! whole document is extracted with pdf-extract and split on form feeds.
//!
//! Metadata comes from the document Info dictionary first and is completed
//! with heuristics over the first page (DOI, year, title) and the file name.

use lopdf::{Document, Object};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

use crate::models::{PageText, RawMetadata};
use crate::utils::text::collapse_whitespace;

/// Errors that can occur during PDF extraction
#[derive(Debug, Error)]
pub enum PdfExtractError {
    #[error("Failed to extract text from PDF: {0}")]
    ExtractionFailed(String),

    #[error("File not found or not a valid PDF: {0}")]
    InvalidFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Text and metadata extracted from one PDF
#[derive(Debug, Clone, Default)]
pub struct ExtractedPdf {
    pub pages: Vec<PageText>,
    pub metadata: RawMetadata,
    /// Heuristic confidence in `[0, 1]` that the file is an academic paper
    pub academic_confidence: f64,
}

impl ExtractedPdf {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|p| p.text.trim().is_empty())
    }
}

/// Extract pages and metadata from a PDF file.
pub fn extract_pdf(path: &Path) -> Result<ExtractedPdf, PdfExtractError> {
    if !path.exists() {
        return Err(PdfExtractError::InvalidFile(format!(
            "File not found: {}",
            path.display()
        )));
    }

    if !path.is_file() {
        return Err(PdfExtractError::InvalidFile(format!(
            "Not a file: {}",
            path.display()
        )));
    }

    let (pages, info) = match Document::load(path) {
        Ok(doc) => {
            let pages = extract_pages(&doc);
            let info = info_metadata(&doc);
            if pages.iter().all(|p| p.text.trim().is_empty()) {
                tracing::debug!(path = %path.display(), "lopdf found no text, trying pdf-extract");
                (extract_with_fallback(path)?, info)
            } else {
                (pages, info)
            }
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "lopdf failed, trying pdf-extract");
            (extract_with_fallback(path)?, RawMetadata::default())
        }
    };

    if pages.iter().all(|p| p.text.trim().is_empty()) {
        // Scanned or image-only PDFs end up here
        tracing::warn!(path = %path.display(), "no extractable text in PDF");
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let first_page = pages.first().map(|p| p.text.as_str()).unwrap_or_default();
    let metadata = complete_metadata(info, first_page, &file_name);
    let academic_confidence = academic_confidence(&metadata, first_page, pages.len());

    Ok(ExtractedPdf {
        pages,
        metadata,
        academic_confidence,
    })
}

fn extract_pages(doc: &Document) -> Vec<PageText> {
    doc.get_pages()
        .keys()
        .map(|&number| {
            let text = doc.extract_text(&[number]).unwrap_or_else(|e| {
                tracing::debug!(page = number, error = %e, "failed to extract page text");
                String::new()
            });
            PageText::new(number, text)
        })
        .collect()
}

fn extract_with_fallback(path: &Path) -> Result<Vec<PageText>, PdfExtractError> {
    let text = pdf_extract::extract_text(path)
        .map_err(|e| PdfExtractError::ExtractionFailed(e.to_string()))?;
    Ok(split_form_feeds(&text))
}

/// Split whole-document text on form feeds; without any, page numbers are unknown.
fn split_form_feeds(text: &str) -> Vec<PageText> {
    if !text.contains('\u{c}') {
        return vec![PageText::unnumbered(text)];
    }
    text.split('\u{c}')
        .enumerate()
        .map(|(i, page)| PageText::new(i as u32 + 1, page))
        .filter(|p| !p.text.trim().is_empty())
        .collect()
}

fn info_metadata(doc: &Document) -> RawMetadata {
    let mut raw = RawMetadata::default();
    let Ok(info_ref) = doc.trailer.get(b"Info") else {
        return raw;
    };
    let info = match info_ref {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Dictionary(dict)) => dict,
            _ => return raw,
        },
        Object::Dictionary(dict) => dict,
        _ => return raw,
    };

    let field = |key: &[u8]| -> Option<String> {
        match info.get(key) {
            Ok(Object::String(bytes, _)) => {
                let decoded = decode_pdf_string(bytes);
                let trimmed = decoded.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            _ => None,
        }
    };

    raw.title = field(b"Title").map(|t| clean_title(&t)).unwrap_or_default();
    raw.authors = field(b"Author")
        .map(|a| split_author_field(&a))
        .unwrap_or_default();
    raw.year = field(b"CreationDate").and_then(|d| year_from_text_date(&d));
    raw
}

/// Decode a PDF text string (UTF-16BE with BOM, otherwise PDFDocEncoding ≈ Latin-1)
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Strip producer prefixes and file extensions from a title
pub fn clean_title(title: &str) -> String {
    let mut title = title.trim();
    for prefix in ["Microsoft Word - ", "Adobe PDF - "] {
        if title.len() >= prefix.len() && title[..prefix.len()].eq_ignore_ascii_case(prefix) {
            title = &title[prefix.len()..];
        }
    }
    for ext in [".pdf", ".docx", ".doc"] {
        if title.to_lowercase().ends_with(ext) {
            title = &title[..title.len() - ext.len()];
        }
    }
    collapse_whitespace(title)
}

/// Split an Info/Author field into individual names ("A; B", "A and B", "A, B & C")
pub fn split_author_field(field: &str) -> Vec<String> {
    let normalized = field.replace(" and ", ";").replace('&', ";");
    let separator = if normalized.contains(';') { ';' } else { ',' };

    // "Smith, John" is one author in family-first form, not two
    let parts: Vec<&str> = normalized.split(separator).map(str::trim).collect();
    if separator == ',' && parts.len() == 2 && !parts[1].contains(' ') {
        return vec![field.trim().to_string()];
    }

    parts
        .into_iter()
        .filter(|p| p.chars().filter(|c| c.is_alphabetic()).count() > 1)
        .map(String::from)
        .collect()
}

fn regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// Find the first DOI in text
pub fn extract_doi(text: &str) -> Option<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = regex(&RE, r#"(?i)\b(10\.\d{4,9}/[^\s"'<>]+)"#)?;
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .trim_end_matches(['.', ',', ';', ')', ']'])
                .to_string()
        })
        .find(|doi| doi.len() > 7)
}

/// Year from a PDF date ("D:20200315...") or any string containing a year
pub fn year_from_text_date(date: &str) -> Option<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = regex(&RE, r"(\d{4})")?;
    let year = re.captures(date)?.get(1)?.as_str();
    let value: i32 = year.parse().ok()?;
    (1900..=max_plausible_year())
        .contains(&value)
        .then(|| year.to_string())
}

fn max_plausible_year() -> i32 {
    use chrono::Datelike;
    chrono::Utc::now().year() + 1
}

/// Publication year from the first lines of a page.
///
/// Years next to publication keywords win; otherwise the first year from
/// 1980 onwards is used.
pub fn extract_year(text: &str) -> Option<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = regex(&RE, r"\b(19\d{2}|20\d{2})\b")?;
    let keywords = ["published", "copyright", "©", "journal", "conference", "proceedings"];
    let max_year = max_plausible_year();

    let mut fallback = None;
    for line in text.lines().take(50) {
        let lower = line.to_lowercase();
        for m in re.find_iter(line) {
            let Ok(year) = m.as_str().parse::<i32>() else {
                continue;
            };
            if !(1900..=max_year).contains(&year) {
                continue;
            }
            if keywords.iter().any(|k| lower.contains(k)) {
                return Some(year.to_string());
            }
            if fallback.is_none() && year >= 1980 {
                fallback = Some(year.to_string());
            }
        }
    }
    fallback
}

/// Guess a title from the first lines of a page
pub fn extract_title(text: &str) -> Option<String> {
    let skip = ["page", "volume", "journal", "doi", "abstract", "keywords", "introduction"];
    let stop = ["author", "university", "department", "email", "@"];
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

    for (i, line) in lines.iter().take(10).enumerate() {
        let len = line.chars().count();
        if len < 10 {
            continue;
        }
        let symbols = line
            .chars()
            .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
            .count();
        if symbols as f64 / len as f64 > 0.3 {
            continue;
        }
        let lower = line.to_lowercase();
        if skip.iter().any(|k| lower.contains(k)) {
            continue;
        }
        if len > 20 && len < 200 {
            let mut title = line.to_string();
            for next in lines.iter().skip(i + 1).take(2) {
                let next_len = next.chars().count();
                let next_lower = next.to_lowercase();
                if next_len > 10 && next_len < 100 && !stop.iter().any(|k| next_lower.contains(k)) {
                    title.push(' ');
                    title.push_str(next);
                } else {
                    break;
                }
            }
            return Some(title);
        }
    }
    None
}

/// Author and year hints from a file name like "Smith (2020) Forest carbon.pdf"
pub fn metadata_from_filename(file_name: &str) -> (Option<String>, Option<String>) {
    static AUTHOR_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let stem = file_name
        .strip_suffix(".pdf")
        .or_else(|| file_name.strip_suffix(".PDF"))
        .unwrap_or(file_name);

    let author = regex(&AUTHOR_RE, r"^([A-Za-z][A-Za-z\s]+?)\s*(?:\(\d{4}\)|\s-\s|_)")
        .and_then(|re| re.captures(stem))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|a| a.len() > 1);
    let year = year_from_text_date(stem);
    (author, year)
}

/// Fill gaps in Info-dictionary metadata from page text and the file name
fn complete_metadata(mut raw: RawMetadata, first_page: &str, file_name: &str) -> RawMetadata {
    if raw.title.is_empty() {
        raw.title = extract_title(first_page).unwrap_or_default();
    }
    if raw.doi.is_none() {
        raw.doi = extract_doi(first_page);
    }
    // Text years are more reliable than the file's creation date
    if let Some(year) = extract_year(first_page) {
        raw.year = Some(year);
    }

    let (file_author, file_year) = metadata_from_filename(file_name);
    if raw.authors.is_empty() {
        raw.authors = file_author.into_iter().collect();
    }
    if raw.year.is_none() {
        raw.year = file_year;
    }
    if raw.title.is_empty() {
        raw.title = clean_title(file_name);
    }
    raw.source_file = Some(file_name.to_string()).filter(|f| !f.is_empty());
    raw
}

/// Heuristic confidence that a PDF is an academic paper
pub fn academic_confidence(raw: &RawMetadata, first_page: &str, page_count: usize) -> f64 {
    let mut score: f64 = 0.0;
    if raw.doi.is_some() {
        score += 2.0;
    }
    if raw.container.is_some() {
        score += 1.5;
    }
    if raw.authors.len() > 1 {
        score += 1.0;
    }
    if raw
        .year
        .as_deref()
        .and_then(|y| y.parse::<i32>().ok())
        .is_some_and(|y| y >= 1980)
    {
        score += 0.5;
    }

    let lower = first_page.to_lowercase();
    for keyword in ["abstract", "introduction", "methodology", "references", "conclusion", "keywords", "doi"] {
        if lower.contains(keyword) {
            score += 0.3;
        }
    }
    if lower.contains("references") || page_count > 5 {
        score += 0.5;
    }
    (score / 10.0).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_nonexistent_file() {
        let result = extract_pdf(Path::new("/nonexistent/file.pdf"));
        assert!(matches!(result, Err(PdfExtractError::InvalidFile(_))));
    }

    #[test]
    fn test_extract_doi() {
        let text = "Available at https://doi.org/10.1038/s41586-020-2649-2. Accessed";
        assert_eq!(extract_doi(text).as_deref(), Some("10.1038/s41586-020-2649-2"));
        assert_eq!(extract_doi("no identifier here"), None);
    }

    #[test]
    fn test_extract_year_prefers_publication_keywords() {
        let text = "Data collected 1985-1990\nPublished online 2019 by Elsevier";
        assert_eq!(extract_year(text).as_deref(), Some("2019"));
        assert_eq!(extract_year("Survey of 1985 data").as_deref(), Some("1985"));
        assert_eq!(extract_year("nothing"), None);
    }

    #[test]
    fn test_year_from_pdf_date() {
        assert_eq!(year_from_text_date("D:20200315120000Z").as_deref(), Some("2020"));
        assert_eq!(year_from_text_date("D:1066"), None);
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("Microsoft Word - forest  carbon.docx"), "forest carbon");
        assert_eq!(clean_title("Paper.pdf"), "Paper");
    }

    #[test]
    fn test_split_author_field() {
        assert_eq!(split_author_field("Smith, John"), vec!["Smith, John"]);
        assert_eq!(
            split_author_field("John Smith and Bob Jones"),
            vec!["John Smith", "Bob Jones"]
        );
        assert_eq!(
            split_author_field("A. Lee; B. Kim"),
            vec!["A. Lee", "B. Kim"]
        );
    }

    #[test]
    fn test_extract_title() {
        let page = "Journal of Forestry Vol 3\nForest Carbon Sinks in Boreal Regions\nJane Doe, University of Oslo\nAbstract";
        assert_eq!(
            extract_title(page).as_deref(),
            Some("Forest Carbon Sinks in Boreal Regions")
        );
    }

    #[test]
    fn test_metadata_from_filename() {
        let (author, year) = metadata_from_filename("Smith (2020) Forest carbon.pdf");
        assert_eq!(author.as_deref(), Some("Smith"));
        assert_eq!(year.as_deref(), Some("2020"));
    }

    #[test]
    fn test_split_form_feeds() {
        let pages = split_form_feeds("one\u{c}two\u{c}");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].page, Some(2));
        assert_eq!(split_form_feeds("whole")[0].page, None);
    }

    #[test]
    fn test_decode_utf16_title() {
        let bytes = [0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69];
        assert_eq!(decode_pdf_string(&bytes), "Hi");
    }
}
