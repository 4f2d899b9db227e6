//! Greedy longest-phrase matching of transcript tokens against the library.

use serde::Serialize;

use crate::library::LibrarySnapshot;

/// Output of matching one segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchOutcome {
    /// Keys to display, in order (phrases or single words)
    pub units: Vec<String>,
    /// Single words consumed standalone that have no library entry,
    /// deduplicated, first-seen order
    pub missing: Vec<String>,
}

/// Match normalized tokens left to right, preferring the longest phrase.
///
/// At each position windows of `min(max_window, remaining)` down to 2 words
/// are tried; the first library hit is emitted as one unit. Otherwise the
/// single token is emitted, and recorded as missing when the library has no
/// entry for it. Words swallowed by a matched phrase are never reported
/// missing.
pub fn match_tokens(tokens: &[String], library: &LibrarySnapshot, max_window: usize) -> MatchOutcome {
    let max_window = max_window.max(1);
    let mut outcome = MatchOutcome::default();
    let mut i = 0;

    while i < tokens.len() {
        let remaining = tokens.len() - i;
        let phrase = (2..=max_window.min(remaining))
            .rev()
            .map(|size| (size, tokens[i..i + size].join(" ")))
            .find(|(_, phrase)| library.contains(phrase));

        match phrase {
            Some((size, phrase)) => {
                outcome.units.push(phrase);
                i += size;
            }
            None => {
                let word = &tokens[i];
                if !library.contains(word) && !outcome.missing.contains(word) {
                    outcome.missing.push(word.clone());
                }
                outcome.units.push(word.clone());
                i += 1;
            }
        }
    }

    outcome
}
