//! Durable error -> fix dictionary
//!
//! The dictionary is shared by every request. Writers take the lock, update
//! the map and rewrite the file before releasing it, so mutations are
//! linearizable and readers never observe a partially applied update.

use crate::storage;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Entries written when no dictionary file exists yet
const SEED_ENTRIES: &[(&str, &str)] = &[("Маркуталь", "Мариуполь")];

pub struct CorrectionDictionary {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl CorrectionDictionary {
    /// Load the dictionary from `path`.
    ///
    /// A missing file is created with the seed entries. An unreadable or
    /// malformed file yields an empty dictionary; the file is left untouched
    /// until the next mutation.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let entries = match storage::read_json::<BTreeMap<String, String>>(&path) {
            Ok(Some(entries)) => {
                let before = entries.len();
                let entries: BTreeMap<String, String> = entries
                    .into_iter()
                    .filter(|(original, corrected)| !original.is_empty() && original != corrected)
                    .collect();
                if entries.len() != before {
                    tracing::warn!(
                        "Ignored {} identity or empty entries in {:?}",
                        before - entries.len(),
                        path
                    );
                }
                tracing::info!("Loaded {} corrections from {:?}", entries.len(), path);
                entries
            }
            Ok(None) => {
                let seeded: BTreeMap<String, String> = SEED_ENTRIES
                    .iter()
                    .map(|(o, c)| (o.to_string(), c.to_string()))
                    .collect();
                if let Err(e) = storage::write_json_atomic(&path, &seeded) {
                    tracing::error!("Failed to write seed corrections to {:?}: {}", path, e);
                } else {
                    tracing::info!("Created corrections dictionary at {:?}", path);
                }
                seeded
            }
            Err(e) => {
                tracing::error!("Failed to load corrections dictionary: {}", e);
                BTreeMap::new()
            }
        };

        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    pub fn get(&self, original: &str) -> Option<String> {
        self.entries.read().get(original).cloned()
    }

    pub fn contains(&self, original: &str) -> bool {
        self.entries.read().contains_key(original)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy of all entries in key order
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.read().clone()
    }

    /// Run `f` against a consistent view of the entries
    pub fn with_entries<R>(&self, f: impl FnOnce(&BTreeMap<String, String>) -> R) -> R {
        f(&self.entries.read())
    }

    /// Insert or update `original -> corrected`.
    ///
    /// Returns `true` when the dictionary changed. Identity pairs and empty
    /// keys are ignored.
    pub fn learn(&self, original: &str, corrected: &str) -> bool {
        if original.is_empty() || original == corrected {
            return false;
        }

        let mut entries = self.entries.write();
        if entries.get(original).map(String::as_str) == Some(corrected) {
            return false;
        }

        entries.insert(original.to_string(), corrected.to_string());
        self.flush(&entries);
        tracing::info!("Added correction: '{}' -> '{}'", original, corrected);
        true
    }

    /// Insert `original -> corrected` only if `original` is not yet a key.
    ///
    /// The presence check and the insert happen under one write lock.
    pub fn insert_if_absent(&self, original: &str, corrected: &str) -> bool {
        if original.is_empty() || original == corrected {
            return false;
        }

        let mut entries = self.entries.write();
        if entries.contains_key(original) {
            return false;
        }

        entries.insert(original.to_string(), corrected.to_string());
        self.flush(&entries);
        true
    }

    /// Modification time of the backing file
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from)
    }

    // In-memory state stays authoritative when the write fails
    fn flush(&self, entries: &BTreeMap<String, String>) {
        if let Err(e) = storage::write_json_atomic(&self.path, entries) {
            tracing::error!("Failed to save corrections dictionary: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_missing_file_is_seeded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrections.json");

        let dictionary = CorrectionDictionary::open(&path);

        assert!(path.exists());
        assert_eq!(dictionary.get("Маркуталь").as_deref(), Some("Мариуполь"));
    }

    #[test]
    fn test_malformed_file_yields_empty_dictionary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrections.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let dictionary = CorrectionDictionary::open(&path);

        assert!(dictionary.is_empty());
    }

    #[test]
    fn test_identity_entries_dropped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrections.json");
        std::fs::write(&path, r#"{"abc": "abc", "xyz": "xz"}"#).unwrap();

        let dictionary = CorrectionDictionary::open(&path);

        assert_eq!(dictionary.len(), 1);
        assert!(!dictionary.contains("abc"));
    }

    #[test]
    fn test_learn_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrections.json");

        let dictionary = CorrectionDictionary::open(&path);
        assert!(dictionary.learn("0ксид", "оксид"));

        let reloaded = CorrectionDictionary::open(&path);
        assert_eq!(reloaded.get("0ксид").as_deref(), Some("оксид"));
    }

    #[test]
    fn test_insert_if_absent_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let dictionary = CorrectionDictionary::open(dir.path().join("c.json"));

        assert!(dictionary.insert_if_absent("abc", "abd"));
        assert!(!dictionary.insert_if_absent("abc", "xyz"));
        assert_eq!(dictionary.get("abc").as_deref(), Some("abd"));
    }

    #[test]
    fn test_last_updated_reads_file_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let dictionary = CorrectionDictionary::open(dir.path().join("c.json"));
        assert!(dictionary.last_updated().is_some());
    }

    proptest! {
        #[test]
        fn prop_learn_never_stores_identity_and_is_idempotent(
            pairs in proptest::collection::vec(("[a-cа-в0-2]{0,3}", "[a-cа-в0-2]{0,3}"), 0..20)
        ) {
            let dir = tempfile::tempdir().unwrap();
            let dictionary = CorrectionDictionary::open(dir.path().join("c.json"));

            for (original, corrected) in &pairs {
                dictionary.learn(original, corrected);
                let after_first = dictionary.snapshot();
                prop_assert!(!dictionary.learn(original, corrected));
                prop_assert_eq!(&after_first, &dictionary.snapshot());
            }

            for (original, corrected) in dictionary.snapshot() {
                prop_assert_ne!(original, corrected);
            }
        }
    }
}
