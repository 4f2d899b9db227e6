//! Sign library access.
//!
//! The engine never touches storage directly. It talks to a [`LibraryStore`]
//! port, mirrors the store's contents in an immutable [`LibrarySnapshot`], and
//! swaps in a fresh snapshot whenever the library changes. Readers (matcher,
//! renderer) clone the snapshot `Arc` and never see a half-updated mapping.

mod json_store;
mod memory;

pub use json_store::JsonLibraryStore;
pub use memory::MemoryLibraryStore;

use signflow_common::Asset;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Errors raised at the library persistence boundary.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    /// Reading or writing the backing store failed
    #[error("library I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The backing store contents could not be decoded
    #[error("library data is malformed: {0}")]
    Parse(String),
    /// The key is empty after normalization
    #[error("invalid library key '{0}'")]
    InvalidKey(String),
    /// The store refused the operation
    #[error("library store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence port for the sign library.
///
/// Keys handed to the store are already normalized.
pub trait LibraryStore: Send + Sync + 'static {
    /// Fetch every entry. Called once at session start and on explicit reload.
    fn get_all(&self) -> Result<HashMap<String, Asset>, LibraryError>;

    /// Insert or replace an entry.
    fn put(&self, key: &str, asset: &Asset) -> Result<(), LibraryError>;

    /// Remove an entry. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), LibraryError>;
}

/// Immutable view of the library at one point in time.
#[derive(Debug, Clone, Default)]
pub struct LibrarySnapshot {
    entries: HashMap<String, Asset>,
}

impl LibrarySnapshot {
    pub fn new(entries: HashMap<String, Asset>) -> Self {
        Self { entries }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Asset> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in sorted order, for listings.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Copy of this snapshot with one entry inserted.
    fn with(&self, key: String, asset: Asset) -> Self {
        let mut entries = self.entries.clone();
        entries.insert(key, asset);
        Self { entries }
    }

    /// Copy of this snapshot with one entry removed.
    fn without(&self, key: &str) -> Self {
        let mut entries = self.entries.clone();
        entries.remove(key);
        Self { entries }
    }
}

impl FromIterator<(String, Asset)> for LibrarySnapshot {
    fn from_iter<I: IntoIterator<Item = (String, Asset)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// The session's handle on the current library snapshot.
///
/// Only the library-mutation path writes; every write replaces the whole
/// snapshot.
#[derive(Debug, Default)]
pub struct SharedLibrary {
    current: RwLock<Arc<LibrarySnapshot>>,
}

impl SharedLibrary {
    pub fn new(snapshot: LibrarySnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<LibrarySnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new snapshot, returning it.
    pub fn replace(&self, snapshot: LibrarySnapshot) -> Arc<LibrarySnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
        snapshot
    }

    /// Replace the snapshot with one that also contains `key`.
    pub fn insert(&self, key: String, asset: Asset) -> Arc<LibrarySnapshot> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(guard.with(key, asset));
        *guard = next.clone();
        next
    }

    /// Replace the snapshot with one that no longer contains `key`.
    /// Returns `None` when the key was absent and nothing changed.
    pub fn remove(&self, key: &str) -> Option<Arc<LibrarySnapshot>> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if !guard.contains(key) {
            return None;
        }
        let next = Arc::new(guard.without(key));
        *guard = next.clone();
        Some(next)
    }
}
