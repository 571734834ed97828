//! Incremental indexing pass.
//!
//! Lists the data folder, classifies every file against the persisted
//! status, and brings the vector collection in line:
//!
//! - **New / modified** files: old chunks for the source are deleted, then
//!   the file is extracted, chunked, embedded and upserted. Chunks whose
//!   content hash matches a previously stored chunk keep that vector. The
//!   fingerprint is recorded only after all of that succeeds.
//! - **Stale** sources, either in the status file or in the store but no
//!   longer in the folder: every chunk for the source is deleted and the
//!   entry dropped.
//! - **Unchanged** files are skipped.
//!
//! A failure on one file is logged and counted; the pass carries on.

use anyhow::{bail, Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::chunk::chunk_segments;
use crate::config::{ChunkingConfig, DataConfig};
use crate::embedding::Embedder;
use crate::extract::extract_path;
use crate::models::{IndexReport, SourceFile};
use crate::scan::scan_folder;
use crate::store::{VectorRecord, VectorStore};
use crate::tracker::{ChangeTracker, FileChange};

pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    data: DataConfig,
    chunking: ChunkingConfig,
    tracker: ChangeTracker,
}

impl Indexer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        data: DataConfig,
        chunking: ChunkingConfig,
    ) -> Self {
        let tracker = ChangeTracker::load(&data.status_path);
        Self {
            embedder,
            store,
            data,
            chunking,
            tracker,
        }
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Run one pass over the data folder.
    pub async fn run(&mut self) -> Result<IndexReport> {
        let listing = scan_folder(&self.data.folder, &self.data.include_globs)?;
        let mut changes = self.tracker.classify(&listing);
        self.add_untracked_sources(&listing, &mut changes).await;
        let mut report = IndexReport::default();

        tracing::info!(
            folder = %self.data.folder.display(),
            files = listing.len(),
            "starting index pass"
        );

        for change in changes {
            match change {
                FileChange::Unchanged(file) => {
                    tracing::debug!(file = %file.name, "unchanged");
                    report.unchanged_files += 1;
                }
                FileChange::Stale(name) => match self.store.delete_source(&name).await {
                    Ok(removed) => {
                        tracing::info!(file = %name, chunks = removed, "removed stale source");
                        report.stale_files += 1;
                        report.chunks_removed += removed;
                        self.tracker.forget(&name);
                    }
                    Err(e) => {
                        tracing::warn!(file = %name, error = %e, "failed to remove stale source");
                        report.failed_files += 1;
                    }
                },
                FileChange::New(file) => {
                    report.new_files += 1;
                    self.reindex(&file, &mut report).await;
                }
                FileChange::Modified(file) => {
                    report.modified_files += 1;
                    self.reindex(&file, &mut report).await;
                }
            }
        }

        if let Err(e) = self.tracker.persist_if_dirty() {
            tracing::warn!(error = %e, "failed to save index status");
        }

        report.total_chunks = self.store.count().await?;
        tracing::info!(
            new = report.new_files,
            modified = report.modified_files,
            unchanged = report.unchanged_files,
            stale = report.stale_files,
            failed = report.failed_files,
            chunks_written = report.chunks_written,
            chunks_reused = report.chunks_reused,
            total_chunks = report.total_chunks,
            "index pass complete"
        );

        Ok(report)
    }

    /// Sources the store holds that are neither in the folder nor already
    /// classified stale. These appear when the status file was lost.
    async fn add_untracked_sources(&self, listing: &[SourceFile], changes: &mut Vec<FileChange>) {
        let stored = match self.store.sources().await {
            Ok(sources) => sources,
            Err(e) => {
                tracing::warn!(error = %e, "could not list stored sources");
                return;
            }
        };

        let known: HashSet<&str> = listing
            .iter()
            .map(|f| f.name.as_str())
            .chain(changes.iter().filter_map(|c| match c {
                FileChange::Stale(name) => Some(name.as_str()),
                _ => None,
            }))
            .collect();
        let orphans: Vec<String> = stored
            .into_iter()
            .filter(|s| !known.contains(s.as_str()))
            .collect();

        for name in orphans {
            tracing::info!(file = %name, "stored source missing from folder and status");
            changes.push(FileChange::Stale(name));
        }
    }

    /// Replace all chunks of `file`; on failure its fingerprint is dropped
    /// so the next pass retries it.
    async fn reindex(&mut self, file: &SourceFile, report: &mut IndexReport) {
        let reusable = match self.store.vectors_by_hash(&file.name).await {
            Ok(vectors) => vectors,
            Err(e) => {
                tracing::warn!(file = %file.name, error = %e, "could not load stored vectors");
                HashMap::new()
            }
        };

        match self.store.delete_source(&file.name).await {
            Ok(removed) => report.chunks_removed += removed,
            Err(e) => {
                tracing::warn!(file = %file.name, error = %e, "failed to clear old chunks");
                report.failed_files += 1;
                self.tracker.forget(&file.name);
                return;
            }
        }

        match self.index_file(file, &reusable).await {
            Ok((written, reused)) => {
                tracing::info!(file = %file.name, chunks = written, reused, "indexed");
                report.chunks_written += written;
                report.chunks_reused += reused;
                self.tracker.record(&file.name, file.fingerprint);
            }
            Err(e) => {
                tracing::warn!(file = %file.name, error = %format!("{:#}", e), "failed to index file");
                report.failed_files += 1;
                self.tracker.forget(&file.name);
            }
        }
    }

    /// Returns `(chunks written, vectors reused)`.
    async fn index_file(
        &self,
        file: &SourceFile,
        reusable: &HashMap<String, Vec<f32>>,
    ) -> Result<(usize, usize)> {
        let path = file.path.clone();
        let segments = tokio::task::spawn_blocking(move || extract_path(&path))
            .await?
            .with_context(|| format!("extraction failed for {}", file.name))?;

        let chunks = chunk_segments(
            &file.name,
            &segments,
            self.chunking.size_chars,
            self.chunking.overlap_chars,
        );
        if chunks.is_empty() {
            tracing::warn!(file = %file.name, "no content extracted");
            return Ok((0, 0));
        }

        let dims = self.embedder.dims();
        let mut vectors: Vec<Option<Vec<f32>>> = chunks
            .iter()
            .map(|c| reusable.get(&c.hash).filter(|v| v.len() == dims).cloned())
            .collect();
        let pending: Vec<String> = chunks
            .iter()
            .zip(&vectors)
            .filter(|(_, v)| v.is_none())
            .map(|(c, _)| c.text.clone())
            .collect();
        let reused = chunks.len() - pending.len();

        if !pending.is_empty() {
            let fresh = self
                .embedder
                .embed(&pending)
                .await
                .with_context(|| format!("embedding failed for {}", file.name))?;
            if fresh.len() != pending.len() {
                bail!(
                    "embedder returned {} vectors for {} chunks",
                    fresh.len(),
                    pending.len()
                );
            }
            let mut fresh = fresh.into_iter();
            for slot in vectors.iter_mut().filter(|v| v.is_none()) {
                *slot = fresh.next();
            }
        }

        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(vectors.into_iter().flatten())
            .map(|(chunk, vector)| VectorRecord { chunk, vector })
            .collect();
        let written = records.len();
        self.store.upsert(&records).await?;

        Ok((written, reused))
    }
}
