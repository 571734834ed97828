//! Data folder listing.
//!
//! Lists the supported documents directly inside the data folder together
//! with their fingerprints. The folder is created when missing so a fresh
//! install indexes zero files instead of failing.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::models::{Fingerprint, SourceFile};

pub fn scan_folder(folder: &Path, include_globs: &[String]) -> Result<Vec<SourceFile>> {
    if !folder.exists() {
        tracing::warn!(folder = %folder.display(), "data folder not found, creating it");
        std::fs::create_dir_all(folder)
            .with_context(|| format!("Failed to create data folder: {}", folder.display()))?;
    }

    let include_set = build_globset(include_globs)?;
    let mut files = Vec::new();

    let walker = WalkDir::new(folder).min_depth(1).max_depth(1);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        // Match case-insensitively so `Report.PDF` is picked up by `*.pdf`.
        if !include_set.is_match(name.to_lowercase()) {
            continue;
        }

        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            // Vanished between listing and stat; the next pass will see it as stale.
            Err(e) => {
                tracing::debug!(file = %name, error = %e, "skipping unreadable entry");
                continue;
            }
        };

        files.push(SourceFile {
            name,
            path: path.to_path_buf(),
            fingerprint: fingerprint_of(&metadata),
        });
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(files)
}

pub fn fingerprint_of(metadata: &std::fs::Metadata) -> Fingerprint {
    let modified = metadata
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    let mtime = modified
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();

    Fingerprint {
        mtime,
        size: metadata.len(),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(&pattern.to_lowercase())?);
    }
    Ok(builder.build()?)
}
