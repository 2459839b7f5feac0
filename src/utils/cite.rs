//! Citation formatting in various styles.
//!
//! Supports APA 7th, MLA 9th, Chicago 17th (author-date) and IEEE. All
//! functions here are pure: the same work, style and locator always produce
//! the same string.

use serde::Serialize;

use crate::models::{Author, Citation, CitationStyle, Work, WorkKind};

/// Placeholder for a missing year
pub const NO_DATE: &str = "n.d.";

/// Placeholder for a missing title
pub const UNTITLED: &str = "Untitled";

/// Placeholder for a missing author in in-text citations
pub const ANONYMOUS: &str = "Anonymous";

/// Format an in-text citation for an accepted [`Citation`]
pub fn format_in_text(citation: &Citation, style: CitationStyle) -> String {
    in_text(
        &citation.work,
        style,
        citation.locator.as_deref(),
        citation.number,
        citation.year_suffix,
    )
}

/// Format an in-text citation from its parts.
///
/// `number` is only used by numeric styles, `year_suffix` only by
/// author-date styles.
pub fn in_text(
    work: &Work,
    style: CitationStyle,
    locator: Option<&str>,
    number: Option<usize>,
    year_suffix: Option<char>,
) -> String {
    match style {
        CitationStyle::Apa => format_apa_in_text(work, locator, year_suffix),
        CitationStyle::Mla => format_mla_in_text(work, locator, year_suffix),
        CitationStyle::Chicago => format_chicago_in_text(work, locator, year_suffix),
        CitationStyle::Ieee => format_ieee_in_text(locator, number),
    }
}

/// Format a reference-list entry for a work
pub fn format_reference(work: &Work, style: CitationStyle) -> String {
    format_reference_with_suffix(work, style, None)
}

/// Format a reference-list entry, appending a disambiguation suffix to the
/// year in author-date styles ("2020a").
pub fn format_reference_with_suffix(
    work: &Work,
    style: CitationStyle,
    year_suffix: Option<char>,
) -> String {
    match style {
        CitationStyle::Apa => format_apa(work, year_suffix),
        CitationStyle::Mla => format_mla(work),
        CitationStyle::Chicago => format_chicago(work, year_suffix),
        CitationStyle::Ieee => format_ieee(work),
    }
}

fn year_label(work: &Work, suffix: Option<char>) -> String {
    match (work.year, suffix) {
        (Some(year), Some(s)) => format!("{}{}", year, s),
        (Some(year), None) => year.to_string(),
        (None, Some(s)) => format!("{}-{}", NO_DATE, s),
        (None, None) => NO_DATE.to_string(),
    }
}

fn title_of(work: &Work) -> &str {
    let title = work.title.trim();
    if title.is_empty() {
        UNTITLED
    } else {
        title
    }
}

/// Append a period unless the text already ends in terminal punctuation
fn terminate(text: &str) -> String {
    let trimmed = text.trim_end();
    if trimmed.ends_with(['.', '?', '!']) {
        trimmed.to_string()
    } else {
        format!("{}.", trimmed)
    }
}

/// Quote a title with the closing punctuation inside the quotes.
fn quoted_title(title: &str, punct: char) -> String {
    if title.ends_with(['.', '?', '!']) {
        format!("\"{}\"", title)
    } else {
        format!("\"{}{}\"", title, punct)
    }
}

fn page_locator(locator: &str) -> String {
    if locator.contains(['-', '–', ',']) {
        format!("pp. {}", locator)
    } else {
        format!("p. {}", locator)
    }
}

fn doi_link(work: &Work) -> Option<String> {
    work.doi
        .as_deref()
        .map(|doi| format!("https://doi.org/{}", doi))
        .or_else(|| work.url.clone())
}

fn surnames(authors: &[Author]) -> Vec<&str> {
    authors.iter().map(|a| a.family.as_str()).collect()
}

/// Format authors for APA in-text: 1 → "Smith", 2 → "Smith & Jones", 3+ → "Smith et al."
fn format_authors_apa_short(authors: &[Author]) -> String {
    match surnames(authors).as_slice() {
        [] => ANONYMOUS.to_string(),
        [one] => one.to_string(),
        [first, second] => format!("{} & {}", first, second),
        [first, ..] => format!("{} et al.", first),
    }
}

fn format_apa_in_text(work: &Work, locator: Option<&str>, suffix: Option<char>) -> String {
    let mut out = format!(
        "({}, {}",
        format_authors_apa_short(&work.authors),
        year_label(work, suffix)
    );
    if let Some(loc) = locator {
        out.push_str(", ");
        out.push_str(&page_locator(loc));
    }
    out.push(')');
    out
}

/// MLA in-text: author and page, no year. Ambiguous authors get a short title.
fn format_mla_in_text(work: &Work, locator: Option<&str>, suffix: Option<char>) -> String {
    let author = match surnames(&work.authors).as_slice() {
        [] => ANONYMOUS.to_string(),
        [one] => one.to_string(),
        [first, second] => format!("{} and {}", first, second),
        [first, ..] => format!("{} et al.", first),
    };

    let mut parts = vec![author];
    if suffix.is_some() {
        let short: Vec<&str> = title_of(work).split_whitespace().take(3).collect();
        let short = short.join(" ");
        let short = short.trim_end_matches([',', ':', ';', '.']);
        parts[0].push(',');
        parts.push(format!("\"{}\"", short));
    }
    if let Some(loc) = locator {
        parts.push(loc.to_string());
    }
    format!("({})", parts.join(" "))
}

/// Chicago in-text: up to three surnames, four or more use "et al."
fn format_chicago_in_text(work: &Work, locator: Option<&str>, suffix: Option<char>) -> String {
    let author = match surnames(&work.authors).as_slice() {
        [] => ANONYMOUS.to_string(),
        [one] => one.to_string(),
        [first, second] => format!("{} and {}", first, second),
        [first, second, third] => format!("{}, {}, and {}", first, second, third),
        [first, ..] => format!("{} et al.", first),
    };

    let mut out = format!("({} {}", author, year_label(work, suffix));
    if let Some(loc) = locator {
        out.push_str(", ");
        out.push_str(loc);
    }
    out.push(')');
    out
}

fn format_ieee_in_text(locator: Option<&str>, number: Option<usize>) -> String {
    let number = number.map_or_else(|| "?".to_string(), |n| n.to_string());
    match locator {
        Some(loc) => format!("[{}, {}]", number, page_locator(loc)),
        None => format!("[{}]", number),
    }
}

fn format_author_apa_single(author: &Author) -> String {
    let initials = author.initials();
    if initials.is_empty() {
        author.family.clone()
    } else {
        format!("{}, {}", author.family, initials)
    }
}

/// Format authors as "Last, F. M., & Last, F. M."
///
/// APA lists up to 20 authors; beyond that the first 19, an ellipsis and the
/// final author.
fn format_authors_apa(authors: &[Author]) -> String {
    let formatted: Vec<String> = authors.iter().map(format_author_apa_single).collect();
    match formatted.len() {
        0 => String::new(),
        1 => formatted[0].clone(),
        2 => format!("{}, & {}", formatted[0], formatted[1]),
        n @ 3..=20 => format!("{}, & {}", formatted[..n - 1].join(", "), formatted[n - 1]),
        n => format!("{}, . . . {}", formatted[..19].join(", "), formatted[n - 1]),
    }
}

/// Venue with volume(issue) and pages, e.g. "Nature, 12(3), 45-67"
fn apa_source(work: &Work) -> Option<String> {
    let container = work.container.as_deref()?;
    let mut out = container.to_string();
    match (&work.volume, &work.issue) {
        (Some(v), Some(i)) => out.push_str(&format!(", {}({})", v, i)),
        (Some(v), None) => out.push_str(&format!(", {}", v)),
        _ => {}
    }
    if let Some(pages) = &work.pages {
        out.push_str(&format!(", {}", pages));
    }
    Some(out)
}

/// Format work in APA 7th edition
/// Format: Author, A. A., & Author, B. B. (Year). Title. Source. Publisher. DOI
fn format_apa(work: &Work, suffix: Option<char>) -> String {
    let year = year_label(work, suffix);
    let title = title_of(work);
    let mut parts = Vec::new();

    if work.authors.is_empty() {
        parts.push(terminate(title));
        parts.push(format!("({}).", year));
    } else {
        parts.push(terminate(&format_authors_apa(&work.authors)));
        parts.push(format!("({}).", year));
        parts.push(terminate(title));
    }

    if let Some(source) = apa_source(work) {
        parts.push(terminate(&source));
    }
    if let Some(publisher) = publisher_if_distinct(work) {
        parts.push(terminate(publisher));
    }
    if let Some(link) = doi_link(work) {
        parts.push(link);
    }

    parts.join(" ")
}

fn publisher_if_distinct(work: &Work) -> Option<&str> {
    let publisher = work.publisher.as_deref()?;
    let same_as_container = work
        .container
        .as_deref()
        .is_some_and(|c| c.eq_ignore_ascii_case(publisher));
    (!same_as_container).then_some(publisher)
}

/// Format authors as "Last, First, and First Last"; three or more use "et al."
fn format_authors_mla(authors: &[Author]) -> String {
    match authors {
        [] => String::new(),
        [one] => one.family_first(),
        [first, second] => format!("{}, and {}", first.family_first(), second.given_first()),
        [first, ..] => format!("{}, et al.", first.family_first()),
    }
}

/// Format work in MLA 9th edition
/// Format: Author. "Title." Container, vol. V, no. I, Publisher, Year, pp. P, DOI.
fn format_mla(work: &Work) -> String {
    let mut out = String::new();
    if !work.authors.is_empty() {
        out.push_str(&terminate(&format_authors_mla(&work.authors)));
        out.push(' ');
    }
    out.push_str(&quoted_title(title_of(work), '.'));

    let mut tail = Vec::new();
    if let Some(container) = &work.container {
        tail.push(container.clone());
    }
    if let Some(volume) = &work.volume {
        tail.push(format!("vol. {}", volume));
    }
    if let Some(issue) = &work.issue {
        tail.push(format!("no. {}", issue));
    }
    if let Some(publisher) = publisher_if_distinct(work) {
        tail.push(publisher.to_string());
    }
    if let Some(year) = work.year {
        tail.push(year.to_string());
    }
    if let Some(pages) = &work.pages {
        tail.push(format!("pp. {}", pages));
    }
    if let Some(link) = doi_link(work) {
        tail.push(link);
    }

    if !tail.is_empty() {
        out.push(' ');
        out.push_str(&terminate(&tail.join(", ")));
    }
    out
}

/// Format authors as "Last, First, First Last, and First Last".
///
/// Up to ten authors are listed; beyond that the first seven and "et al."
fn format_authors_chicago(authors: &[Author]) -> String {
    let listed: Vec<String> = authors
        .iter()
        .enumerate()
        .map(|(i, a)| if i == 0 { a.family_first() } else { a.given_first() })
        .collect();
    match listed.len() {
        0 => String::new(),
        1 => listed[0].clone(),
        2 => format!("{}, and {}", listed[0], listed[1]),
        n @ 3..=10 => format!("{}, and {}", listed[..n - 1].join(", "), listed[n - 1]),
        _ => format!("{}, et al.", listed[..7].join(", ")),
    }
}

/// Format work in Chicago 17th edition (author-date)
/// Format: Author. Year. "Title." Container Volume (Issue): Pages. Publisher. DOI.
fn format_chicago(work: &Work, suffix: Option<char>) -> String {
    let year = year_label(work, suffix);
    let mut parts = Vec::new();

    if work.authors.is_empty() {
        parts.push(quoted_title(title_of(work), '.'));
        parts.push(terminate(&year));
    } else {
        parts.push(terminate(&format_authors_chicago(&work.authors)));
        parts.push(terminate(&year));
        parts.push(quoted_title(title_of(work), '.'));
    }

    if let Some(container) = &work.container {
        let mut source = container.clone();
        if let Some(volume) = &work.volume {
            source.push(' ');
            source.push_str(volume);
        }
        if let Some(issue) = &work.issue {
            source.push_str(&format!(" ({})", issue));
        }
        if let Some(pages) = &work.pages {
            source.push_str(&format!(": {}", pages));
        }
        parts.push(terminate(&source));
    }
    if let Some(publisher) = publisher_if_distinct(work) {
        parts.push(terminate(publisher));
    }
    if let Some(link) = doi_link(work) {
        parts.push(terminate(&link));
    }

    parts.join(" ")
}

fn format_author_ieee_single(author: &Author) -> String {
    let initials = author.initials();
    if initials.is_empty() {
        author.family.clone()
    } else {
        format!("{} {}", initials, author.family)
    }
}

/// Format authors as "J. Smith, B. Jones, and C. Lee"; seven or more use "et al."
fn format_authors_ieee(authors: &[Author]) -> String {
    let formatted: Vec<String> = authors.iter().map(format_author_ieee_single).collect();
    match formatted.len() {
        0 => String::new(),
        1 => formatted[0].clone(),
        2 => format!("{} and {}", formatted[0], formatted[1]),
        n @ 3..=6 => format!("{}, and {}", formatted[..n - 1].join(", "), formatted[n - 1]),
        _ => format!("{} et al.", formatted[0]),
    }
}

/// Format work in IEEE style
/// Format: A. Author and B. Author, "Title," Container, vol. V, no. I, pp. P, Year, doi: D.
fn format_ieee(work: &Work) -> String {
    let mut parts = Vec::new();
    if !work.authors.is_empty() {
        parts.push(format_authors_ieee(&work.authors));
    }

    let title = title_of(work);
    let mut fields = Vec::new();
    if let Some(container) = &work.container {
        fields.push(container.clone());
    }
    if let Some(volume) = &work.volume {
        fields.push(format!("vol. {}", volume));
    }
    if let Some(issue) = &work.issue {
        fields.push(format!("no. {}", issue));
    }
    if let Some(pages) = &work.pages {
        fields.push(format!("pp. {}", pages));
    }
    if let Some(publisher) = publisher_if_distinct(work) {
        if work.kind == WorkKind::Book || work.container.is_none() {
            fields.push(publisher.to_string());
        }
    }
    fields.push(year_label(work, None));

    let body = format!("{} {}", quoted_title(title, ','), fields.join(", "));
    parts.push(body);

    let mut out = parts.join(", ");
    match (&work.doi, &work.url) {
        (Some(doi), _) => out.push_str(&format!(", doi: {}.", doi)),
        (None, Some(url)) => out.push_str(&format!(". [Online]. Available: {}", url)),
        (None, None) => out.push('.'),
    }
    out
}

/// Structured citation data for JSON output
#[derive(Debug, Serialize)]
pub struct StructuredCitation {
    pub style: String,
    pub work_id: String,
    pub formatted: String,
    pub in_text: String,
    pub authors: Vec<String>,
    pub title: String,
    pub year: String,
    pub doi: Option<String>,
}

/// Get structured citation data for a work (in-text form without locator)
pub fn get_structured_citation(work: &Work, style: CitationStyle) -> StructuredCitation {
    StructuredCitation {
        style: style.to_string(),
        work_id: work.work_id.to_string(),
        formatted: format_reference(work, style),
        in_text: in_text(work, style, None, Some(1), None),
        authors: work.authors.iter().map(Author::family_first).collect(),
        title: title_of(work).to_string(),
        year: year_label(work, None),
        doi: work.doi.clone(),
    }
}
