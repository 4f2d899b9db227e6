//! Ordered, deduplicated record of words with no library entry.

use std::collections::HashSet;

use crate::library::LibrarySnapshot;

/// Words seen in finalized speech that the library cannot show yet.
///
/// Order is first-seen order; a word already present is never re-appended.
#[derive(Debug, Clone, Default)]
pub struct MissingSet {
    order: Vec<String>,
    members: HashSet<String>,
}

impl MissingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `word` unless already present. Returns whether it was added.
    pub fn insert(&mut self, word: &str) -> bool {
        if self.members.contains(word) {
            return false;
        }
        self.members.insert(word.to_string());
        self.order.push(word.to_string());
        true
    }

    /// Append every new word, returning how many were added.
    pub fn extend<'a>(&mut self, words: impl IntoIterator<Item = &'a String>) -> usize {
        words.into_iter().filter(|w| self.insert(w)).count()
    }

    /// Remove `word`. Returns whether it was present.
    pub fn remove(&mut self, word: &str) -> bool {
        if !self.members.remove(word) {
            return false;
        }
        self.order.retain(|w| w != word);
        true
    }

    /// Drop every word the library now has an entry for.
    /// Returns how many were removed.
    pub fn retain_unknown(&mut self, library: &LibrarySnapshot) -> usize {
        let before = self.order.len();
        self.order.retain(|w| !library.contains(w));
        self.members.retain(|w| !library.contains(w));
        before - self.order.len()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }

    pub fn contains(&self, word: &str) -> bool {
        self.members.contains(word)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
