//! Core data models shared by the indexing and query pipelines.
//!
//! These types describe source files and their fingerprints, the chunks
//! stored in the vector collection, and the results that flow from the
//! retriever into the answer composer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cheap change detector for a file: modification time and byte size.
///
/// `mtime` is seconds since the Unix epoch with sub-second precision, so a
/// rewrite within the same second still changes the fingerprint on
/// filesystems that record nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub mtime: f64,
    pub size: u64,
}

/// A document found in the data folder.
///
/// The chunk ids currently indexed for it are not cached here; ask the store
/// with [`VectorStore::ids_for_source`](crate::store::VectorStore::ids_for_source).
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Stable name relative to the data folder (also the chunk `source`).
    pub name: String,
    pub path: std::path::PathBuf,
    pub fingerprint: Fingerprint,
}

/// Whether a chunk holds prose or a table rendered as Markdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Table,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Table => "table",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ContentKind::Text),
            "table" => Some(ContentKind::Table),
            _ => None,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata stored alongside every vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    /// 1-based page number for PDFs; `1` for formats without pages.
    pub page: u32,
    pub kind: ContentKind,
}

/// A chunk ready to be written to the vector store.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub ordinal: usize,
    pub text: String,
    pub hash: String,
    pub metadata: ChunkMetadata,
}

/// Deterministic chunk id: `{source}_{ordinal}`.
pub fn chunk_id(source: &str, ordinal: usize) -> String {
    format!("{}_{}", source, ordinal)
}

/// A chunk as read back from the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// One retrieved chunk and its distance to the query (smaller is closer).
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: StoredChunk,
    pub distance: f32,
}

/// Nearest chunks for one query, closest first.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub items: Vec<RetrievedChunk>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Mean distance of the returned set, `None` when nothing was retrieved.
    pub fn mean_distance(&self) -> Option<f32> {
        if self.items.is_empty() {
            return None;
        }
        let total: f32 = self.items.iter().map(|i| i.distance).sum();
        Some(total / self.items.len() as f32)
    }
}

/// Why a query was or was not allowed to draw on external knowledge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionReason {
    Disabled,
    SpecificContext(String),
    SufficientContext,
    Conceptual(String),
    NotConceptual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalKnowledgeDecision {
    pub eligible: bool,
    pub reason: DecisionReason,
}

/// Outcome of one indexing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub new_files: usize,
    pub modified_files: usize,
    pub unchanged_files: usize,
    pub stale_files: usize,
    pub failed_files: usize,
    pub chunks_written: usize,
    /// Chunks whose stored vector was kept because their text was unchanged.
    pub chunks_reused: usize,
    pub chunks_removed: usize,
    pub total_chunks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retrieved(distance: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk: StoredChunk {
                id: "a.md_0".to_string(),
                text: "x".to_string(),
                metadata: ChunkMetadata {
                    source: "a.md".to_string(),
                    page: 1,
                    kind: ContentKind::Text,
                },
            },
            distance,
        }
    }

    #[test]
    fn test_chunk_id_format() {
        assert_eq!(chunk_id("report.pdf", 3), "report.pdf_3");
    }

    #[test]
    fn test_mean_distance() {
        assert_eq!(RetrievalResult::default().mean_distance(), None);
        let result = RetrievalResult {
            items: vec![retrieved(0.2), retrieved(0.4)],
        };
        assert!((result.mean_distance().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_content_kind_roundtrip_names() {
        assert_eq!(ContentKind::parse("table"), Some(ContentKind::Table));
        assert_eq!(ContentKind::Text.to_string(), "text");
        assert_eq!(ContentKind::parse("image"), None);
    }
}
