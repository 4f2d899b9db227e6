//! In-memory sign library, for embedding and tests.

use signflow_common::Asset;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{LibraryError, LibraryStore};

/// Library store that keeps everything in memory.
#[derive(Default)]
pub struct MemoryLibraryStore {
    entries: Mutex<HashMap<String, Asset>>,
    fail_writes: AtomicBool,
}

impl MemoryLibraryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `entries`.
    pub fn with_entries(entries: impl IntoIterator<Item = (String, Asset)>) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().collect()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make subsequent `put`/`delete` calls fail, simulating an unavailable
    /// backing store.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn check_writable(&self) -> Result<(), LibraryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LibraryError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

impl LibraryStore for MemoryLibraryStore {
    fn get_all(&self) -> Result<HashMap<String, Asset>, LibraryError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn put(&self, key: &str, asset: &Asset) -> Result<(), LibraryError> {
        self.check_writable()?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), asset.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), LibraryError> {
        self.check_writable()?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}
