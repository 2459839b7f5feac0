//! Claim extraction: sentence segmentation and needs-citation scoring.

use futures_util::future::join_all;
use regex::Regex;
use std::sync::OnceLock;

use crate::config::ClaimsConfig;
use crate::models::{Claim, ClaimKind, Decision, Span};
use crate::oracle::{GuardedOracle, OracleOutcome};

/// Score of a plain declarative sentence before markers are applied
const BASE_SCORE: f64 = 0.5;

/// Abbreviations after which a period never ends a sentence
const ABBREVIATIONS: &[&str] = &[
    "al", "approx", "cf", "ch", "dept", "dr", "e.g", "ed", "eds", "eq", "fig", "figs", "i.e",
    "jr", "mr", "mrs", "ms", "no", "p", "pp", "prof", "sec", "sr", "st", "univ", "viz", "vol",
    "vs",
];

/// Abbreviations that end a sentence only when a capitalised word follows
const SOFT_ABBREVIATIONS: &[&str] = &["co", "etc", "inc", "ltd", "u.k", "u.s"];

pub(crate) const CLOSERS: &[char] = &['"', '\'', '\u{201D}', '\u{2019}', ')', ']'];

/// Split text into sentence spans (byte offsets, whitespace trimmed).
///
/// Paragraph breaks always end a sentence, and markdown headings are their
/// own segment.
pub fn segment_sentences(text: &str) -> Vec<Span> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut in_quote = false;

    let mut k = 0;
    while k < chars.len() {
        let (pos, c) = chars[k];
        if start.is_none() {
            if c.is_whitespace() {
                k += 1;
                continue;
            }
            start = Some(pos);
        }

        match c {
            '\n' => {
                let heading = start.is_some_and(|s| text[s..].starts_with('#'));
                if heading || paragraph_break(&chars, k) {
                    push_span(&mut spans, text, start.take(), pos);
                    in_quote = false;
                }
            }
            '"' => in_quote = !in_quote,
            '\u{201C}' => in_quote = true,
            '\u{201D}' => in_quote = false,
            '.' | '!' | '?' => {
                let mut j = k + 1;
                let mut closes_quote = false;
                while j < chars.len() && CLOSERS.contains(&chars[j].1) {
                    if matches!(chars[j].1, '"' | '\u{201D}') {
                        closes_quote = true;
                    }
                    j += 1;
                }
                let at_gap = j == chars.len() || chars[j].1.is_whitespace();
                if at_gap
                    && (!in_quote || closes_quote)
                    && !continues_sentence(text, &chars, k, j)
                {
                    let end = if j < chars.len() { chars[j].0 } else { text.len() };
                    push_span(&mut spans, text, start.take(), end);
                    if closes_quote {
                        in_quote = false;
                    }
                    k = j;
                    continue;
                }
            }
            _ => {}
        }
        k += 1;
    }
    push_span(&mut spans, text, start, text.len());
    spans
}

fn push_span(spans: &mut Vec<Span>, text: &str, start: Option<usize>, end: usize) {
    let Some(start) = start else {
        return;
    };
    let trimmed_end = start + text[start..end].trim_end().len();
    if trimmed_end > start {
        spans.push(Span::new(start, trimmed_end));
    }
}

fn paragraph_break(chars: &[(usize, char)], newline: usize) -> bool {
    chars[newline + 1..]
        .iter()
        .take_while(|(_, c)| c.is_whitespace())
        .any(|(_, c)| *c == '\n')
}

/// Whether the punctuation at `k` is inside a sentence (abbreviation,
/// initial, or followed by a lowercase word).
fn continues_sentence(text: &str, chars: &[(usize, char)], k: usize, j: usize) -> bool {
    let next = chars[j..].iter().map(|(_, c)| *c).find(|c| !c.is_whitespace());
    let Some(next) = next else {
        return false;
    };
    if next.is_lowercase() {
        return true;
    }
    if chars[k].1 != '.' {
        return false;
    }

    let end = chars[k].0;
    let word_start = text[..end]
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphabetic() || *c == '.')
        .last()
        .map_or(end, |(i, _)| i);
    let word = &text[word_start..end];
    if word.is_empty() {
        return false;
    }

    let lower = word.to_lowercase();
    if ABBREVIATIONS.contains(&lower.as_str()) {
        return true;
    }
    if SOFT_ABBREVIATIONS.contains(&lower.as_str()) {
        return !next.is_uppercase();
    }
    // Initials such as "J." in "J. Smith"
    word.chars().count() == 1 && word.chars().all(char::is_uppercase)
}

fn regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn is_match(cell: &'static OnceLock<Option<Regex>>, pattern: &str, text: &str) -> bool {
    regex(cell, pattern).is_some_and(|re| re.is_match(text))
}

/// Whether a sentence already carries a citation such as `(Smith, 2020)`,
/// `Smith et al. (2020a)`, `[3, 5-7]` or `(n.d.)`
pub fn has_citation_marker(sentence: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    is_match(
        &RE,
        r"(?x)
        \([^()]*?[A-Z][\p{L}'’\-]+(?:\s+et\s+al\.?)?,?\s+(?:1[5-9]\d{2}|20\d{2})[a-z]?\b[^()]*\)
        | [A-Z][\p{L}'’\-]+(?:\s+et\s+al\.?|\s+(?:and|&)\s+[A-Z][\p{L}'’\-]+)?\s+\((?:1[5-9]\d{2}|20\d{2})[a-z]?(?:,\s*[^()]*)?\)
        | \[\s*\d+(?:\s*[-–,]\s*\d+)*\s*\]
        | \([^()]*\bn\.\s?d\.\)
        ",
        sentence,
    )
}

/// Heuristic needs-citation score in `[0, 1]` and the claim kind
pub fn heuristic_score(sentence: &str, min_words: usize) -> (f64, ClaimKind) {
    static NUMBERS: OnceLock<Option<Regex>> = OnceLock::new();
    static STATS: OnceLock<Option<Regex>> = OnceLock::new();
    static REPORTING: OnceLock<Option<Regex>> = OnceLock::new();
    static CAUSAL: OnceLock<Option<Regex>> = OnceLock::new();
    static GENERAL: OnceLock<Option<Regex>> = OnceLock::new();
    static THEORY: OnceLock<Option<Regex>> = OnceLock::new();
    static METHOD: OnceLock<Option<Regex>> = OnceLock::new();
    static OPINION: OnceLock<Option<Regex>> = OnceLock::new();
    static SELF_REF: OnceLock<Option<Regex>> = OnceLock::new();

    let numeric = is_match(
        &NUMBERS,
        r"(?i)\d+(?:\.\d+)?\s*%|\bpercent\b|\bp\s*[<=>]\s*0?\.\d+|\b\d{2,}\b",
        sentence,
    );
    let statistical = numeric
        || is_match(
            &STATS,
            r"(?i)\b(?:mean|median|average|significant(?:ly)?|correlat\w*|variance)\b",
            sentence,
        );
    let reporting = is_match(
        &REPORTING,
        r"(?i)\b(?:show(?:s|n|ed)?|found|finds|findings|demonstrat\w*|indicat\w*|suggest\w*|report\w*|reveal\w*|confirm\w*|according\s+to|evidence|stud(?:y|ies)|research(?:ers)?|observ\w*|estimat\w*)\b",
        sentence,
    );
    let causal = is_match(
        &CAUSAL,
        r"(?i)\b(?:caus\w*|leads?\s+to|led\s+to|result(?:s|ed)?\s+in|due\s+to|because|increas\w*|decreas\w*|reduc\w*|contribut\w*|associated\s+with|linked\s+to|affect\w*|impact\w*)\b",
        sentence,
    );
    let general = is_match(
        &GENERAL,
        r"(?i)\b(?:most|many|widely|generally|commonly|often|typically|always|never|majority|numerous|consensus|well[- ](?:known|established))\b",
        sentence,
    );
    let theoretical = is_match(
        &THEORY,
        r"(?i)\b(?:theor\w*|framework|paradigm|concept\w*|models?|hypothes\w*)\b",
        sentence,
    );
    let methodological = is_match(
        &METHOD,
        r"(?i)\b(?:method\w*|approach(?:es)?|techniques?|procedures?|protocols?|measur\w*|sampl\w*|survey\w*|experiment\w*)\b",
        sentence,
    );
    let interpretive = is_match(
        &OPINION,
        r"(?i)\b(?:argu\w*|believ\w*|interpret\w*|perspective|debat\w*|controvers\w*)\b",
        sentence,
    );
    let self_reference = is_match(
        &SELF_REF,
        r"(?i:\b(?:we|our|us|my)\b|\bthis\s+(?:paper|study|article|thesis|chapter|section|work)\b|\b(?:perhaps|maybe|might|possibly)\b)|\bI\b",
        sentence,
    );

    let mut score = BASE_SCORE;
    if numeric {
        score += 0.3;
    }
    if reporting {
        score += 0.25;
    }
    if causal {
        score += 0.15;
    }
    if general {
        score += 0.1;
    }
    if theoretical || methodological {
        score += 0.1;
    }
    if self_reference {
        score -= 0.4;
    }
    if sentence.split_whitespace().count() < min_words {
        score -= 0.3;
    }

    let kind = if statistical {
        ClaimKind::Statistical
    } else if methodological {
        ClaimKind::Methodological
    } else if theoretical {
        ClaimKind::Theoretical
    } else if interpretive {
        ClaimKind::Interpretation
    } else {
        ClaimKind::Factual
    };
    (score.clamp(0.0, 1.0), kind)
}

/// Why a sentence is never a claim, if it isn't
fn skip_reason(sentence: &str, min_words: usize) -> Option<&'static str> {
    let trimmed = sentence.trim_end_matches(CLOSERS);
    if trimmed.ends_with('?') {
        return Some("question");
    }
    let terminal = matches!(trimmed.chars().last(), Some('.' | '!'));
    if sentence.starts_with('#') || (!terminal && sentence.split_whitespace().count() < min_words) {
        return Some("heading");
    }
    if has_citation_marker(sentence) {
        return Some("already cited");
    }
    None
}

/// Flags manuscript sentences that need a citation.
#[derive(Debug, Clone, Default)]
pub struct ClaimExtractor {
    config: ClaimsConfig,
    oracle: Option<GuardedOracle>,
}

struct Pending {
    span: Span,
    text: String,
    score: f64,
    kind: ClaimKind,
}

impl ClaimExtractor {
    pub fn new(config: ClaimsConfig) -> Self {
        Self {
            config,
            oracle: None,
        }
    }

    /// Consult `oracle` for sentences whose heuristic score is inconclusive
    pub fn with_oracle(mut self, oracle: Option<GuardedOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    /// Flagged claims in document order.
    ///
    /// Without a usable oracle, inconclusive sentences are decided by the
    /// fallback threshold and marked [`Decision::Degraded`].
    pub async fn extract(&self, text: &str) -> Vec<Claim> {
        let mut claims = Vec::new();
        let mut ambiguous = Vec::new();

        for span in segment_sentences(text) {
            let Some(sentence) = span.slice(text) else {
                continue;
            };
            if let Some(reason) = skip_reason(sentence, self.config.min_words) {
                tracing::trace!(start = span.start, reason, "sentence skipped");
                continue;
            }

            let (score, kind) = heuristic_score(sentence, self.config.min_words);
            let pending = Pending {
                span,
                text: sentence.to_string(),
                score,
                kind,
            };
            if score >= self.config.flag_threshold {
                claims.push(self.decide(pending, true, score, Decision::Heuristic));
            } else if score >= self.config.reject_threshold {
                ambiguous.push(pending);
            }
        }

        claims.extend(self.resolve_ambiguous(ambiguous).await);
        claims.retain(|c| c.needs_support);
        claims.sort_by_key(|c| c.span);
        tracing::debug!(claims = claims.len(), "claims extracted");
        claims
    }

    async fn resolve_ambiguous(&self, pending: Vec<Pending>) -> Vec<Claim> {
        let oracle = self
            .oracle
            .as_ref()
            .filter(|o| o.supports_claim_judgement() && o.is_available());
        let Some(oracle) = oracle else {
            if !pending.is_empty() {
                tracing::debug!(sentences = pending.len(), "no claim oracle, applying fallback threshold");
            }
            return pending.into_iter().map(|p| self.fallback(p)).collect();
        };

        let verdicts = join_all(pending.iter().map(|p| oracle.judge_claim(&p.text))).await;
        pending
            .into_iter()
            .zip(verdicts)
            .map(|(p, verdict)| match verdict {
                OracleOutcome::Scored(judgement) => {
                    let probability = judgement.needs_citation();
                    let needs = probability >= 0.5;
                    let confidence = if needs { probability } else { 1.0 - probability };
                    let kind = judgement.kind.unwrap_or(p.kind);
                    self.decide(Pending { kind, ..p }, needs, confidence, Decision::Oracle)
                }
                OracleOutcome::TimedOut | OracleOutcome::Failed(_) => self.fallback(p),
            })
            .collect()
    }

    fn fallback(&self, pending: Pending) -> Claim {
        let needs = pending.score >= self.config.fallback_threshold;
        let base = if needs { pending.score } else { 1.0 - pending.score };
        self.decide(pending, needs, base * 0.5, Decision::Degraded)
    }

    fn decide(&self, pending: Pending, needs: bool, confidence: f64, decided_by: Decision) -> Claim {
        Claim {
            span: pending.span,
            text: pending.text,
            needs_support: needs,
            confidence: confidence.clamp(0.0, 1.0),
            score: pending.score,
            kind: pending.kind,
            decided_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracle;
    use std::sync::Arc;
    use std::time::Duration;

    fn sentences(text: &str) -> Vec<&str> {
        segment_sentences(text)
            .into_iter()
            .filter_map(|s| s.slice(text))
            .collect()
    }

    #[test]
    fn test_segment_handles_abbreviations() {
        let text = "Forests matter, e.g. for carbon. Smith et al. found a 3.5% rise. Dr. Lee agreed!";
        assert_eq!(
            sentences(text),
            vec![
                "Forests matter, e.g. for carbon.",
                "Smith et al. found a 3.5% rise.",
                "Dr. Lee agreed!"
            ]
        );
    }

    #[test]
    fn test_segment_quotes_and_paragraphs() {
        let text = "He wrote \"Trees grow. They die.\" Then he left.\n\n# Results\nRates rose sharply in 2019";
        assert_eq!(
            sentences(text),
            vec![
                "He wrote \"Trees grow. They die.\"",
                "Then he left.",
                "# Results",
                "Rates rose sharply in 2019"
            ]
        );
    }

    #[test]
    fn test_segment_initials_and_us() {
        let text = "J. A. Smith studied the U.S. economy. Prices rose etc. in the end.";
        assert_eq!(
            sentences(text),
            vec!["J. A. Smith studied the U.S. economy.", "Prices rose etc. in the end."]
        );
    }

    #[test]
    fn test_citation_markers() {
        assert!(has_citation_marker("Carbon rose (Smith, 2020)."));
        assert!(has_citation_marker("Carbon rose (Smith et al., 2020a)."));
        assert!(has_citation_marker("Carbon rose (Smith 2020, 4)."));
        assert!(has_citation_marker("Smith and Jones (2019) showed this."));
        assert!(has_citation_marker("Carbon rose [3, 5-7]."));
        assert!(has_citation_marker("Carbon rose (WHO, n.d.)."));
        assert!(!has_citation_marker("Carbon rose between 1990 and 2000."));
        assert!(!has_citation_marker("Carbon rose (see Figure 2)."));
    }

    #[test]
    fn test_heuristic_scores() {
        let (stat, kind) = heuristic_score("Studies show that deforestation increases emissions by 12%.", 4);
        assert_eq!(stat, 1.0);
        assert_eq!(kind, ClaimKind::Statistical);

        let (plain, kind) = heuristic_score("Trees absorb carbon dioxide.", 4);
        assert_eq!(plain, 0.5);
        assert_eq!(kind, ClaimKind::Factual);

        let (own, _) = heuristic_score("In this paper we describe our approach.", 4);
        assert!(own < 0.35);
    }

    #[tokio::test]
    async fn test_extract_without_oracle() {
        let text = "Studies show that deforestation increases emissions by 12%. \
            In this paper we describe our approach. \
            Is carbon capture viable? \
            Trees absorb carbon dioxide. \
            Emissions rose in 2019 (Smith, 2020).";
        let extractor = ClaimExtractor::new(ClaimsConfig::default());
        let claims = extractor.extract(text).await;

        assert_eq!(claims.len(), 2);
        assert_eq!(claims[0].decided_by, Decision::Heuristic);
        assert_eq!(claims[1].text, "Trees absorb carbon dioxide.");
        assert_eq!(claims[1].decided_by, Decision::Degraded);
        assert!(claims[0].span < claims[1].span);
        assert_eq!(claims[1].span.slice(text), Some("Trees absorb carbon dioxide."));
    }

    #[tokio::test]
    async fn test_extract_consults_oracle_for_ambiguous() {
        let text = "Trees absorb carbon dioxide. Studies show emissions rose by 12%.";
        let mock = Arc::new(MockOracle::new().with_judgement(0.1));
        let oracle = GuardedOracle::new(mock.clone(), Duration::from_secs(1), 3);
        let extractor = ClaimExtractor::new(ClaimsConfig::default()).with_oracle(Some(oracle));

        let claims = extractor.extract(text).await;
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].decided_by, Decision::Heuristic);
        // Only the ambiguous sentence reached the oracle
        assert_eq!(mock.call_count(), 1);
    }
}
