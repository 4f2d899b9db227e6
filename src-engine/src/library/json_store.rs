//! JSON-file backed sign library.
//!
//! The file holds one JSON object mapping normalized keys to data references.
//! Byte payloads are written as base64 `data:` URLs so the file stays
//! self-contained.

use base64::Engine;
use serde_json::{Map, Value};
use signflow_common::{Asset, AssetPayload};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

use super::{LibraryError, LibraryStore};
use crate::text::normalize_key;

/// Sign library persisted as a single JSON file.
pub struct JsonLibraryStore {
    path: PathBuf,
    /// Serialized form of every entry, mirrored from disk
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonLibraryStore {
    /// Open the library at `path`, loading whatever can be parsed.
    ///
    /// Never fails: a missing file is an empty library, an unparseable file is
    /// backed up to `<name>.bak` and replaced by an empty library, and
    /// individual malformed entries are skipped.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self, entries: &BTreeMap<String, String>) -> Result<(), LibraryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| LibraryError::Parse(e.to_string()))?;

        // Write-then-rename so a crash never leaves a truncated library.
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl LibraryStore for JsonLibraryStore {
    fn get_all(&self) -> Result<HashMap<String, Asset>, LibraryError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .iter()
            .map(|(key, reference)| {
                (
                    key.clone(),
                    Asset::from_payload(AssetPayload::Reference(reference.clone())),
                )
            })
            .collect())
    }

    fn put(&self, key: &str, asset: &Asset) -> Result<(), LibraryError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), to_reference(asset));
        self.write_file(&entries)
    }

    fn delete(&self, key: &str) -> Result<(), LibraryError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.write_file(&entries)
    }
}

/// Encode an asset as the string stored in the library file.
pub(crate) fn to_reference(asset: &Asset) -> String {
    match asset.payload() {
        AssetPayload::Reference(reference) => reference.clone(),
        AssetPayload::Bytes(bytes) => format!(
            "data:{};base64,{}",
            asset.mime(),
            base64::engine::general_purpose::STANDARD.encode(bytes)
        ),
    }
}

fn load_entries(path: &Path) -> BTreeMap<String, String> {
    if !path.exists() {
        info!("[Library] No library file at {:?}, starting empty", path);
        return BTreeMap::new();
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("[Library] Failed to read library file {:?}: {}", path, e);
            return BTreeMap::new();
        }
    };

    let object = match serde_json::from_str::<Map<String, Value>>(&content) {
        Ok(object) => object,
        Err(e) => {
            warn!(
                "[Library] Corrupted library file, backing up and starting fresh: {}",
                e
            );
            let backup_path = path.with_extension("json.bak");
            if let Err(e) = fs::rename(path, &backup_path) {
                warn!("[Library] Failed to back up {:?}: {}", path, e);
            }
            return BTreeMap::new();
        }
    };

    let mut entries = BTreeMap::new();
    let mut skipped = 0usize;
    for (raw_key, value) in object {
        let key = normalize_key(&raw_key);
        match value {
            Value::String(reference) if !key.is_empty() && !reference.is_empty() => {
                entries.insert(key, reference);
            }
            _ => {
                warn!("[Library] Skipping malformed entry {:?}", raw_key);
                skipped += 1;
            }
        }
    }

    info!(
        "[Library] Loaded {} sign(s) from {:?} ({} skipped)",
        entries.len(),
        path,
        skipped
    );
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use signflow_common::AssetKind;

    fn video() -> Asset {
        Asset::from_payload(AssetPayload::Reference("data:video/webm;base64,GkXf".into()))
    }

    #[test]
    fn test_missing_file_is_empty_library() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLibraryStore::open(dir.path().join("library.json"));
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_reopened_entries_keep_their_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");

        let store = JsonLibraryStore::open(&path);
        store
            .put(
                "dog",
                &Asset::from_payload(AssetPayload::Bytes(vec![0xFF, 0xD8, 0xFF, 0xE0, 0])),
            )
            .unwrap();
        let mut mp4 = vec![0, 0, 0, 0x18];
        mp4.extend_from_slice(b"ftypisom");
        store
            .put("wave", &Asset::from_payload(AssetPayload::Bytes(mp4)))
            .unwrap();

        let all = JsonLibraryStore::open(&path).get_all().unwrap();
        assert_eq!(all["dog"].mime(), "image/jpeg");
        assert_eq!(all["wave"].mime(), "video/mp4");
        assert!(all["wave"].is_video());
    }

    #[test]
    fn test_put_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signs").join("library.json");

        let store = JsonLibraryStore::open(&path);
        store.put("thank you", &video()).unwrap();
        store
            .put(
                "cat",
                &Asset::from_payload(AssetPayload::Bytes(vec![0x89, b'P', b'N', b'G', 1, 2])),
            )
            .unwrap();

        let reopened = JsonLibraryStore::open(&path);
        let all = reopened.get_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["thank you"].kind(), AssetKind::Video);
        assert_eq!(all["cat"].kind(), AssetKind::Image);
        match all["cat"].payload() {
            AssetPayload::Reference(r) => assert!(r.starts_with("data:image/png;base64,")),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_delete_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");
        let store = JsonLibraryStore::open(&path);
        store.put("hello", &video()).unwrap();
        store.delete("hello").unwrap();
        store.delete("never-there").unwrap();

        assert!(JsonLibraryStore::open(&path).get_all().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_backed_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");
        fs::write(&path, "{ this is not json").unwrap();

        let store = JsonLibraryStore::open(&path);
        assert!(store.get_all().unwrap().is_empty());
        assert!(dir.path().join("library.json.bak").exists());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");
        fs::write(
            &path,
            r#"{"Hello!": "data:image/png;base64,AA", "bad": 42, "???": "data:image/png;base64,AA", "empty": ""}"#,
        )
        .unwrap();

        let all = JsonLibraryStore::open(&path).get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("hello"));
    }
}
