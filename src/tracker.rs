//! Change tracking for the data folder.
//!
//! The [`ChangeTracker`] owns the persisted [`IndexStatus`] (file name →
//! last indexed [`Fingerprint`]) and classifies the current folder listing
//! against it. The status is only an advisory cache: the vector store stays
//! the ground truth for what can be retrieved.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::models::{Fingerprint, SourceFile};

/// Persisted mapping of source name to its last indexed fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexStatus {
    entries: BTreeMap<String, Fingerprint>,
}

impl IndexStatus {
    pub fn get(&self, name: &str) -> Option<&Fingerprint> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Classification of one file for the current pass.
#[derive(Debug, Clone)]
pub enum FileChange {
    New(SourceFile),
    Modified(SourceFile),
    Unchanged(SourceFile),
    /// Previously indexed, no longer in the folder.
    Stale(String),
}

impl FileChange {
    pub fn name(&self) -> &str {
        match self {
            FileChange::New(f) | FileChange::Modified(f) | FileChange::Unchanged(f) => &f.name,
            FileChange::Stale(name) => name,
        }
    }
}

pub struct ChangeTracker {
    path: PathBuf,
    status: IndexStatus,
    dirty: bool,
}

impl ChangeTracker {
    /// Load the status file. A missing or unreadable file means a full
    /// re-index, never an error.
    pub fn load(path: &Path) -> Self {
        let status = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<IndexStatus>(&content) {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "status file is corrupt, re-indexing everything"
                    );
                    IndexStatus::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexStatus::default(),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "could not read status file, re-indexing everything"
                );
                IndexStatus::default()
            }
        };

        Self {
            path: path.to_path_buf(),
            status,
            dirty: false,
        }
    }

    pub fn status(&self) -> &IndexStatus {
        &self.status
    }

    /// Compare the folder listing with the recorded fingerprints.
    ///
    /// Files come back in listing order, followed by stale entries in name
    /// order.
    pub fn classify(&self, listing: &[SourceFile]) -> Vec<FileChange> {
        let mut changes = Vec::with_capacity(listing.len());
        let present: HashSet<&str> = listing.iter().map(|f| f.name.as_str()).collect();

        for file in listing {
            let change = match self.status.get(&file.name) {
                None => FileChange::New(file.clone()),
                Some(fp) if *fp == file.fingerprint => FileChange::Unchanged(file.clone()),
                Some(_) => FileChange::Modified(file.clone()),
            };
            changes.push(change);
        }

        for name in self.status.names() {
            if !present.contains(name) {
                changes.push(FileChange::Stale(name.to_string()));
            }
        }

        changes
    }

    /// Record a successfully indexed file.
    pub fn record(&mut self, name: &str, fingerprint: Fingerprint) {
        let previous = self.status.entries.insert(name.to_string(), fingerprint);
        if previous != Some(fingerprint) {
            self.dirty = true;
        }
    }

    /// Drop the entry for a file that is gone or whose re-indexing failed.
    pub fn forget(&mut self, name: &str) {
        if self.status.entries.remove(name).is_some() {
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the status file if anything changed since it was loaded.
    ///
    /// Returns whether a write happened.
    pub fn persist_if_dirty(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(&self.status)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write status file: {}", self.path.display()))?;
        self.dirty = false;
        tracing::info!(path = %self.path.display(), files = self.status.len(), "saved index status");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, mtime: f64, size: u64) -> SourceFile {
        SourceFile {
            name: name.to_string(),
            path: PathBuf::from(name),
            fingerprint: Fingerprint { mtime, size },
        }
    }

    #[test]
    fn test_missing_status_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let tracker = ChangeTracker::load(&tmp.path().join("status.json"));
        assert!(tracker.status().is_empty());
        assert!(!tracker.is_dirty());
    }

    #[test]
    fn test_corrupt_status_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("status.json");
        std::fs::write(&path, "{ not json").unwrap();
        let tracker = ChangeTracker::load(&path);
        assert!(tracker.status().is_empty());
    }

    #[test]
    fn test_classify_all_states() {
        let tmp = tempfile::tempdir().unwrap();
        let mut tracker = ChangeTracker::load(&tmp.path().join("status.json"));
        tracker.record("same.md", Fingerprint { mtime: 10.0, size: 5 });
        tracker.record("changed.md", Fingerprint { mtime: 10.0, size: 5 });
        tracker.record("gone.md", Fingerprint { mtime: 10.0, size: 5 });

        let listing = vec![
            file("changed.md", 10.0, 6),
            file("fresh.md", 1.0, 1),
            file("same.md", 10.0, 5),
        ];
        let changes = tracker.classify(&listing);

        assert!(matches!(&changes[0], FileChange::Modified(f) if f.name == "changed.md"));
        assert!(matches!(&changes[1], FileChange::New(f) if f.name == "fresh.md"));
        assert!(matches!(&changes[2], FileChange::Unchanged(f) if f.name == "same.md"));
        assert!(matches!(&changes[3], FileChange::Stale(n) if n == "gone.md"));
        assert_eq!(changes.len(), 4);
    }

    #[test]
    fn test_mtime_change_alone_is_modification() {
        let tmp = tempfile::tempdir().unwrap();
        let mut tracker = ChangeTracker::load(&tmp.path().join("status.json"));
        tracker.record("a.md", Fingerprint { mtime: 10.0, size: 5 });
        let changes = tracker.classify(&[file("a.md", 10.5, 5)]);
        assert!(matches!(changes[0], FileChange::Modified(_)));
    }

    #[test]
    fn test_persist_only_when_dirty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state").join("status.json");

        let mut tracker = ChangeTracker::load(&path);
        assert!(!tracker.persist_if_dirty().unwrap());
        assert!(!path.exists());

        tracker.record("a.md", Fingerprint { mtime: 1.5, size: 3 });
        assert!(tracker.persist_if_dirty().unwrap());
        assert!(path.exists());

        // Re-recording the same fingerprint does not dirty the record.
        tracker.record("a.md", Fingerprint { mtime: 1.5, size: 3 });
        assert!(!tracker.persist_if_dirty().unwrap());

        let reloaded = ChangeTracker::load(&path);
        assert_eq!(
            reloaded.status().get("a.md"),
            Some(&Fingerprint { mtime: 1.5, size: 3 })
        );
    }

    #[test]
    fn test_status_file_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("status.json");
        let mut tracker = ChangeTracker::load(&path);
        tracker.record("doc.pdf", Fingerprint { mtime: 2.0, size: 7 });
        tracker.persist_if_dirty().unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["doc.pdf"]["size"], 7);
        assert_eq!(json["doc.pdf"]["mtime"], 2.0);
    }

    #[test]
    fn test_forget_marks_dirty() {
        let tmp = tempfile::tempdir().unwrap();
        let mut tracker = ChangeTracker::load(&tmp.path().join("status.json"));
        tracker.forget("never-seen.md");
        assert!(!tracker.is_dirty());
        tracker.record("a.md", Fingerprint { mtime: 1.0, size: 1 });
        tracker.persist_if_dirty().unwrap();
        tracker.forget("a.md");
        assert!(tracker.is_dirty());
    }
}
