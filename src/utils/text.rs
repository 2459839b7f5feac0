//! Text normalization shared by the index, the resolver and the claim extractor.

/// Lowercase surname particles kept in front of the family name
pub const NAME_PARTICLES: &[&str] = &[
    "van", "von", "de", "der", "den", "da", "di", "du", "la", "le", "del", "dos", "ten", "ter",
];

/// English stopwords removed before lexical scoring
pub const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

/// Returns true if `word` (already lowercased) is a stopword
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.binary_search(&word).is_ok()
}

/// Split text into lowercase alphanumeric tokens, dropping stopwords and
/// single characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| t.chars().count() > 1 && !is_stopword(t))
        .collect()
}

/// Token string used for matching: `tokenize` joined with single spaces
pub fn normalize_for_matching(text: &str) -> String {
    tokenize(text).join(" ")
}

/// Normalize a title for identity comparison.
///
/// Lowercases, drops punctuation and collapses whitespace. Stopwords are kept
/// so that "The Origin" and "Origin" stay distinct.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapse runs of whitespace (including newlines) to single spaces
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title-case a single name word if it is entirely upper- or lowercase.
///
/// Mixed-case words such as "McDonald" are returned unchanged. Hyphen and
/// apostrophe separated parts are cased independently ("o'BRIEN" → "O'Brien").
pub fn normalize_name_case(word: &str) -> String {
    let has_upper = word.chars().any(char::is_uppercase);
    let has_lower = word.chars().any(char::is_lowercase);
    if has_upper && has_lower && !is_uniform_parts(word) {
        return word.to_string();
    }

    let mut out = String::with_capacity(word.len());
    let mut start_of_part = true;
    for c in word.chars() {
        if c == '-' || c == '\'' || c == '.' {
            out.push(c);
            start_of_part = true;
        } else if start_of_part {
            out.extend(c.to_uppercase());
            start_of_part = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

// "o'BRIEN": each part uniform in case, but parts differ
fn is_uniform_parts(word: &str) -> bool {
    word.split(['-', '\''])
        .filter(|p| p.chars().count() > 1)
        .any(|p| p.chars().filter(|c| c.is_alphabetic()).all(char::is_uppercase))
}

/// Normalize a DOI: lowercase, strip resolver prefixes and trailing punctuation
pub fn normalize_doi(doi: &str) -> String {
    let trimmed = doi.trim();
    let lower = trimmed.to_lowercase();
    let prefixes = [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi:",
    ];
    let stripped = prefixes
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .unwrap_or(lower.as_str());
    stripped
        .trim()
        .trim_end_matches(['.', ',', ';', ')'])
        .to_string()
}

/// Normalize an ISBN to its digits (and a trailing X)
pub fn normalize_isbn(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| c.is_ascii_digit() || *c == 'X' || *c == 'x')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Truncate to at most `max_chars` characters, appending "..." when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut.trim_end())
}
