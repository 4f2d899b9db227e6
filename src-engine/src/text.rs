//! Transcript tokenization and library key normalization.

/// Typographic punctuation stripped in addition to ASCII punctuation.
const EXTRA_PUNCTUATION: &[char] = &['“', '”', '„', '…'];

fn is_stripped(c: char) -> bool {
    (c.is_ascii_punctuation() && c != '\'' && c != '-') || EXTRA_PUNCTUATION.contains(&c)
}

/// Normalize a single word: lowercase, trimmed, punctuation removed.
///
/// Apostrophes and hyphens survive so that "don't" and "x-ray" stay intact.
pub fn normalize_token(word: &str) -> String {
    word.trim()
        .chars()
        .filter(|c| !is_stripped(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split one finalized transcript segment into normalized word tokens.
///
/// Tokens that are empty after punctuation removal are dropped, so a
/// whitespace-only or punctuation-only segment yields nothing.
pub fn tokenize(segment: &str) -> Vec<String> {
    segment
        .split_whitespace()
        .map(normalize_token)
        .filter(|token| !token.is_empty())
        .collect()
}

/// Normalize a library key (word or phrase) the same way speech is normalized.
pub fn normalize_key(raw: &str) -> String {
    tokenize(raw).join(" ")
}
