//! # Content Index
//!
//! Persistent `signature -> canonical path` map plus the set of paths that
//! have already been accounted for, one per library folder.
//!
//! ## Invariants
//! - Every indexed path is the first-seen representative for its signature.
//! - Duplicates are never admitted, so no two entries share content.
//! - Stale entries (files removed outside the program) are dropped by
//!   [`ContentIndex::reconcile_removed`] before any new hashing.
//!
//! Paths are stored relative to the library folder so a library can be
//! moved without losing its history.
//!
//! The index is not meant for concurrent mutation. Callers own it through a
//! `&mut` borrow of the library, or route calls through a single mutex.

mod store;

pub use store::{ENTRIES_FILE, KNOWN_PATHS_FILE};

use crate::core::hasher::Signature;
use crate::error::IndexError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use store::{RawTables, TableRead};
use tracing::{debug, warn};

/// Where the in-memory index came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexOrigin {
    /// No tables on disk: the library has never been indexed
    Missing,
    /// Both tables parsed
    Loaded,
    /// Tables were present but unusable and have been replaced by an empty index
    Recovered,
}

/// Result of [`ContentIndex::classify`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// First time this signature is seen; the path is now its representative
    Original,
    /// Content already indexed under another path
    DuplicateOf(PathBuf),
}

/// Paths dropped by [`ContentIndex::reconcile_removed`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub removed: Vec<PathBuf>,
    /// Kept duplicates forgotten so the next pass hashes them again
    pub requeued: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ContentIndex {
    entries: HashMap<Signature, PathBuf>,
    known_paths: BTreeSet<PathBuf>,
    origin: IndexOrigin,
    recovery_reason: Option<String>,
}

impl ContentIndex {
    /// An empty, never-persisted index
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            known_paths: BTreeSet::new(),
            origin: IndexOrigin::Missing,
            recovery_reason: None,
        }
    }

    /// Load the tables for `library`.
    ///
    /// Never fails: unreadable tables yield an empty index with
    /// [`IndexOrigin::Recovered`], trading dedup history for availability.
    pub fn load(library: &Path) -> Self {
        let raw = match store::read_tables(library) {
            TableRead::Missing => return Self::new(),
            TableRead::Corrupt(error) => {
                warn!("Discarding unreadable index in {}: {}", library.display(), error);
                return Self {
                    origin: IndexOrigin::Recovered,
                    recovery_reason: Some(error.to_string()),
                    ..Self::new()
                };
            }
            TableRead::Loaded(raw) => raw,
        };

        let mut entries = HashMap::with_capacity(raw.entries.len());
        for (key, path) in raw.entries {
            match key.parse::<Signature>() {
                Ok(signature) => {
                    entries.insert(signature, store::relative_from_key(&path));
                }
                Err(error) => {
                    let error = IndexError::Corrupt {
                        path: library.join(ENTRIES_FILE),
                        reason: error.to_string(),
                    };
                    warn!("Discarding unreadable index in {}: {}", library.display(), error);
                    return Self {
                        origin: IndexOrigin::Recovered,
                        recovery_reason: Some(error.to_string()),
                        ..Self::new()
                    };
                }
            }
        }

        let mut known_paths: BTreeSet<PathBuf> = raw
            .known_paths
            .iter()
            .map(String::as_str)
            .map(store::relative_from_key)
            .collect();

        // An entry whose path is not known would never be reconciled away.
        known_paths.extend(entries.values().cloned());

        debug!(
            "Loaded index for {}: {} entries, {} known paths",
            library.display(),
            entries.len(),
            known_paths.len()
        );

        Self {
            entries,
            known_paths,
            origin: IndexOrigin::Loaded,
            recovery_reason: None,
        }
    }

    /// Persist both tables atomically.
    pub fn save(&mut self, library: &Path) -> Result<(), IndexError> {
        let tables = RawTables {
            entries: self
                .entries
                .iter()
                .map(|(signature, path)| (signature.to_hex(), store::path_key(path)))
                .collect(),
            known_paths: self.known_paths.iter().map(|p| store::path_key(p)).collect(),
        };
        store::write_tables(library, &tables)?;
        self.origin = IndexOrigin::Loaded;
        self.recovery_reason = None;
        Ok(())
    }

    /// Drop every known path that is no longer among `current_files`,
    /// together with the entry it represents.
    ///
    /// When an entry goes, known paths without an entry of their own
    /// (duplicates kept after review) are forgotten as well. One of them may
    /// hold the content that just lost its representative, and it must be
    /// hashed again to take its place.
    pub fn reconcile_removed(&mut self, current_files: &HashSet<PathBuf>) -> RemovalReport {
        let removed: Vec<PathBuf> = self
            .known_paths
            .iter()
            .filter(|path| !current_files.contains(*path))
            .cloned()
            .collect();

        if removed.is_empty() {
            return RemovalReport::default();
        }

        let gone: HashSet<&PathBuf> = removed.iter().collect();
        let before = self.entries.len();
        self.entries.retain(|_, path| !gone.contains(path));
        let entry_dropped = self.entries.len() != before;
        for path in &removed {
            self.known_paths.remove(path);
            debug!("Removed stale index entry {}", path.display());
        }

        let requeued: Vec<PathBuf> = if entry_dropped {
            let indexed: HashSet<&PathBuf> = self.entries.values().collect();
            self.known_paths
                .iter()
                .filter(|path| !indexed.contains(*path))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        for path in &requeued {
            self.known_paths.remove(path);
            debug!("Requeued kept duplicate {}", path.display());
        }

        RemovalReport { removed, requeued }
    }

    /// Admit `path` as the representative of `signature`, or report the
    /// path that already holds it. A duplicate leaves the index untouched.
    pub fn classify(&mut self, path: &Path, signature: Signature) -> Classification {
        if let Some(existing) = self.entries.get(&signature) {
            return Classification::DuplicateOf(existing.clone());
        }
        self.entries.insert(signature, path.to_path_buf());
        self.known_paths.insert(path.to_path_buf());
        Classification::Original
    }

    /// Record a path as accounted for without indexing its content.
    ///
    /// Used for duplicates a person chose to keep after review.
    pub fn mark_known(&mut self, path: &Path) {
        self.known_paths.insert(path.to_path_buf());
    }

    pub fn is_known(&self, path: &Path) -> bool {
        self.known_paths.contains(path)
    }

    /// Representative path for `signature`, if indexed
    pub fn lookup(&self, signature: &Signature) -> Option<&Path> {
        self.entries.get(signature).map(PathBuf::as_path)
    }

    /// All `(signature, path)` pairs, in no particular order
    pub fn entries(&self) -> impl Iterator<Item = (&Signature, &Path)> {
        self.entries.iter().map(|(s, p)| (s, p.as_path()))
    }

    pub fn known_paths(&self) -> impl Iterator<Item = &Path> {
        self.known_paths.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn known_len(&self) -> usize {
        self.known_paths.len()
    }

    pub fn origin(&self) -> IndexOrigin {
        self.origin
    }

    /// Why the persisted tables were discarded, when they were
    pub fn recovery_reason(&self) -> Option<&str> {
        self.recovery_reason.as_deref()
    }

    /// Whether this library already had a usable index on disk
    pub fn is_persisted(&self) -> bool {
        self.origin == IndexOrigin::Loaded
    }

    /// Indexed paths that no longer exist under `library`
    pub fn missing_entries(&self, library: &Path) -> Vec<PathBuf> {
        let mut missing: Vec<PathBuf> = self
            .entries
            .values()
            .filter(|path| !library.join(path).exists())
            .cloned()
            .collect();
        missing.sort();
        missing
    }
}

impl Default for ContentIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sig(hex: &str) -> Signature {
        hex.parse().unwrap()
    }

    fn files(names: &[&str]) -> HashSet<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn classify_admits_first_and_rejects_second() {
        let mut index = ContentIndex::new();

        assert_eq!(index.classify(Path::new("A.jpg"), sig("aa")), Classification::Original);
        assert_eq!(
            index.classify(Path::new("B.jpg"), sig("aa")),
            Classification::DuplicateOf(PathBuf::from("A.jpg"))
        );

        assert_eq!(index.len(), 1);
        assert!(index.is_known(Path::new("A.jpg")));
        assert!(!index.is_known(Path::new("B.jpg")));
    }

    #[test]
    fn reconcile_drops_known_path_and_its_entry() {
        let mut index = ContentIndex::new();
        index.classify(Path::new("A.jpg"), sig("aa"));
        index.classify(Path::new("C.jpg"), sig("cc"));

        let report = index.reconcile_removed(&files(&["C.jpg"]));

        assert_eq!(report.removed, vec![PathBuf::from("A.jpg")]);
        assert!(index.lookup(&sig("aa")).is_none());
        assert!(!index.is_known(Path::new("A.jpg")));
        assert_eq!(index.lookup(&sig("cc")), Some(Path::new("C.jpg")));
    }

    #[test]
    fn reconcile_lets_removed_content_be_admitted_again() {
        let mut index = ContentIndex::new();
        index.classify(Path::new("A.jpg"), sig("aa"));
        index.reconcile_removed(&files(&["B.jpg"]));

        assert_eq!(index.classify(Path::new("B.jpg"), sig("aa")), Classification::Original);
    }

    #[test]
    fn reconcile_requeues_kept_duplicates_when_an_entry_goes() {
        let mut index = ContentIndex::new();
        index.classify(Path::new("A.jpg"), sig("aa"));
        index.classify(Path::new("C.jpg"), sig("cc"));
        index.mark_known(Path::new("B.jpg"));

        let report = index.reconcile_removed(&files(&["B.jpg", "C.jpg"]));

        assert_eq!(report.removed, vec![PathBuf::from("A.jpg")]);
        assert_eq!(report.requeued, vec![PathBuf::from("B.jpg")]);
        assert!(!index.is_known(Path::new("B.jpg")));
        assert!(index.is_known(Path::new("C.jpg")));
        assert_eq!(index.classify(Path::new("B.jpg"), sig("aa")), Classification::Original);
    }

    #[test]
    fn kept_duplicates_stay_known_when_only_they_are_removed() {
        let mut index = ContentIndex::new();
        index.classify(Path::new("A.jpg"), sig("aa"));
        index.mark_known(Path::new("B.jpg"));
        index.mark_known(Path::new("D.jpg"));

        let report = index.reconcile_removed(&files(&["A.jpg", "B.jpg"]));

        assert_eq!(report.removed, vec![PathBuf::from("D.jpg")]);
        assert!(report.requeued.is_empty());
        assert!(index.is_known(Path::new("B.jpg")));
    }

    #[test]
    fn reconcile_with_nothing_removed_is_empty() {
        let mut index = ContentIndex::new();
        index.classify(Path::new("A.jpg"), sig("aa"));
        assert!(index.reconcile_removed(&files(&["A.jpg"])).removed.is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut index = ContentIndex::new();
        index.classify(Path::new("A.jpg"), sig("0011223344556677"));
        index.mark_known(Path::new("kept-duplicate.jpg"));

        index.save(dir.path()).unwrap();
        let loaded = ContentIndex::load(dir.path());

        assert_eq!(loaded.origin(), IndexOrigin::Loaded);
        assert_eq!(loaded.lookup(&sig("0011223344556677")), Some(Path::new("A.jpg")));
        assert!(loaded.is_known(Path::new("kept-duplicate.jpg")));
        assert_eq!(loaded.known_len(), 2);
    }

    #[test]
    fn missing_tables_load_as_empty_missing_index() {
        let dir = TempDir::new().unwrap();
        let index = ContentIndex::load(dir.path());
        assert!(index.is_empty());
        assert_eq!(index.origin(), IndexOrigin::Missing);
        assert!(!index.is_persisted());
    }

    #[test]
    fn corrupt_tables_load_as_empty_recovered_index() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(ENTRIES_FILE), "{ not json").unwrap();
        fs::write(dir.path().join(KNOWN_PATHS_FILE), "[]").unwrap();

        let index = ContentIndex::load(dir.path());

        assert!(index.is_empty());
        assert_eq!(index.origin(), IndexOrigin::Recovered);
        assert!(index.recovery_reason().unwrap().contains(ENTRIES_FILE));
    }

    #[test]
    fn invalid_signature_key_is_treated_as_corruption() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(ENTRIES_FILE), r#"{"not-hex": "A.jpg"}"#).unwrap();
        fs::write(dir.path().join(KNOWN_PATHS_FILE), r#"["A.jpg"]"#).unwrap();

        let index = ContentIndex::load(dir.path());
        assert_eq!(index.origin(), IndexOrigin::Recovered);
        assert_eq!(index.known_len(), 0);
    }

    #[test]
    fn load_repairs_entries_missing_from_known_paths() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(ENTRIES_FILE), r#"{"ff00": "A.jpg"}"#).unwrap();
        fs::write(dir.path().join(KNOWN_PATHS_FILE), "[]").unwrap();

        let mut index = ContentIndex::load(dir.path());
        assert!(index.is_known(Path::new("A.jpg")));

        let report = index.reconcile_removed(&HashSet::new());
        assert_eq!(report.removed, vec![PathBuf::from("A.jpg")]);
        assert!(index.is_empty());
    }

    #[test]
    fn missing_entries_lists_vanished_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("present.jpg"), b"x").unwrap();

        let mut index = ContentIndex::new();
        index.classify(Path::new("present.jpg"), sig("01"));
        index.classify(Path::new("gone.jpg"), sig("02"));

        assert_eq!(index.missing_entries(dir.path()), vec![PathBuf::from("gone.jpg")]);
    }
}
