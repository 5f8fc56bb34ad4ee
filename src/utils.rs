//! Text helpers shared by the parser, classifier, dedup filter and emitter.

use regex::Regex;
use std::sync::LazyLock;

/// Characters allowed to survive in generated file names.
static FILENAME_UNSAFE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s()\-]").expect("Invalid FILENAME_UNSAFE_REGEX"));

/// Maximum length (in characters) of a generated file stem.
const MAX_FILENAME_CHARS: usize = 50;

/// Collapses every run of whitespace into a single space and trims the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strips leading and trailing characters that are neither letters nor digits.
///
/// Interior punctuation such as the apostrophe in "don't" or the hyphen in
/// "well-being" is kept.
pub fn strip_edge_punctuation(text: &str) -> &str {
    text.trim_matches(|c: char| !c.is_alphanumeric())
}

/// Returns the cleaned surface form of a highlight: edge punctuation removed
/// and whitespace collapsed, case preserved.
pub fn clean_text(text: &str) -> String {
    collapse_whitespace(strip_edge_punctuation(text))
}

/// Returns the key used for history and cache lookups: the cleaned surface
/// form, lower-cased.
pub fn normalize_key(text: &str) -> String {
    clean_text(text).to_lowercase()
}

/// Whether a token carries any letters or digits.
pub fn is_word_token(token: &str) -> bool {
    token.chars().any(char::is_alphanumeric)
}

/// Turns a book title into a safe file stem.
///
/// Disallowed characters are removed, whitespace collapsed and the result
/// truncated. Falls back to `"clippings"` when nothing is left.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = FILENAME_UNSAFE_REGEX.replace_all(name, "");
    let collapsed = collapse_whitespace(&cleaned);
    let truncated: String = collapsed.chars().take(MAX_FILENAME_CHARS).collect();
    let trimmed = truncated.trim();

    if trimmed.is_empty() {
        "clippings".to_string()
    } else {
        trimmed.to_string()
    }
}
