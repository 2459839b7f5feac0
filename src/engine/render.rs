//! Rendering an annotated document.

use std::collections::BTreeSet;

use super::claims::CLOSERS;
use crate::models::{Citation, CitationStyle, ReferenceList};

const TERMINALS: &[char] = &['.', '!', '?'];

/// Insert in-text citations into `text` and append the reference list.
///
/// Each citation is placed before its claim's terminal punctuation
/// ("... dioxide (Smith, 2020)."). With `include_quotes`, the supporting
/// quote follows the sentence. Citations whose span no longer fits `text`
/// are skipped.
pub fn render_document(
    text: &str,
    citations: &[Citation],
    references: &ReferenceList,
    include_quotes: bool,
) -> String {
    let mut ordered: Vec<&Citation> = citations.iter().collect();
    ordered.sort_by_key(|c| std::cmp::Reverse(c.claim));

    let mut out = text.to_string();
    for citation in ordered {
        let Some(sentence) = citation.claim.slice(text) else {
            tracing::warn!(
                start = citation.claim.start,
                end = citation.claim.end,
                "citation span outside document; not rendered"
            );
            continue;
        };

        if include_quotes {
            if let Some(quote) = &citation.quote {
                out.insert_str(citation.claim.end, &format!(" [Quote: \"{}\"]", quote));
            }
        }

        let at = citation.claim.start + insertion_point(sentence);
        out.insert_str(at, &format!(" {}", citation.in_text_form));
    }

    let mut rendered = out.trim_end().to_string();
    if !references.is_empty() {
        rendered.push_str("\n\n");
        rendered.push_str(&references.render());
    }
    rendered.push('\n');
    rendered
}

/// Byte offset in `sentence` where its in-text citation goes: before the
/// terminal punctuation and any closing quotes or brackets that follow it.
fn insertion_point(sentence: &str) -> usize {
    let without_closers = sentence.trim_end_matches(CLOSERS);
    if without_closers.ends_with(TERMINALS) {
        without_closers.trim_end_matches(TERMINALS).len()
    } else {
        sentence.trim_end_matches(TERMINALS).len()
    }
}

/// Remove the in-text citations and quotes an earlier render inserted for
/// `citations`, giving back the text their claim spans were taken from.
///
/// A citation marker is only removed where it sits directly before terminal
/// punctuation, which is the only place [`render_document`] puts one.
pub fn strip_citations(text: &str, citations: &[Citation]) -> String {
    let mut out = text.to_string();

    let quotes: BTreeSet<String> = citations
        .iter()
        .filter_map(|c| c.quote.as_ref())
        .map(|q| format!(" [Quote: \"{}\"]", q))
        .collect();
    for quote in &quotes {
        out = out.replace(quote.as_str(), "");
    }

    let markers: BTreeSet<String> = citations
        .iter()
        .filter(|c| !c.in_text_form.is_empty())
        .map(|c| format!(" {}", c.in_text_form))
        .collect();
    for marker in &markers {
        let mut from = 0;
        while let Some(found) = out[from..].find(marker.as_str()) {
            let at = from + found;
            let end = at + marker.len();
            if out[end..].starts_with(TERMINALS) {
                out.replace_range(at..end, "");
                from = at;
            } else {
                from = end;
            }
        }
    }
    out
}

/// Drop a reference section produced by an earlier run.
///
/// The section starts at the last line consisting only of a style's
/// reference header (optionally as a markdown heading).
pub fn strip_reference_section(text: &str) -> &str {
    let mut offset = 0;
    let mut cut = None;
    for line in text.split_inclusive('\n') {
        let heading = line.trim().trim_start_matches('#').trim();
        if CitationStyle::all()
            .iter()
            .any(|style| style.reference_header() == heading)
        {
            cut = Some(offset);
        }
        offset += line.len();
    }
    match cut {
        Some(at) => text[..at].trim_end(),
        None => text,
    }
}
