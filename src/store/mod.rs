//! Vector collection abstraction.
//!
//! The [`VectorStore`] trait is the single source of truth for what has been
//! indexed: chunk id → (vector, text, metadata). Two backends exist:
//! [`SqliteStore`] (persistent, used by the pipeline) and [`InMemoryStore`]
//! (ephemeral, used by tests).
//!
//! Distances are cosine distances (`1 - cosine similarity`), so results are
//! ordered ascending: closest first.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::models::{Chunk, StoredChunk};

/// A chunk together with its embedding, ready for [`VectorStore::upsert`].
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A stored chunk and its distance to a query vector.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub chunk: StoredChunk,
    pub distance: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite records by chunk id.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// Remove every chunk whose source is `source`, returning how many went.
    async fn delete_source(&self, source: &str) -> Result<usize>;

    async fn count(&self) -> Result<usize>;

    /// The `k` nearest chunks to `vector`, ascending by distance.
    /// Returns at most `min(k, count)` items.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// Chunk ids currently stored for `source`, in ordinal order.
    async fn ids_for_source(&self, source: &str) -> Result<Vec<String>>;

    /// Distinct source names present in the collection, sorted.
    async fn sources(&self) -> Result<Vec<String>>;

    /// Stored vectors for `source`, keyed by chunk content hash.
    async fn vectors_by_hash(&self, source: &str) -> Result<HashMap<String, Vec<f32>>>;
}

/// Sort neighbors closest first (ties broken by id) and keep `k`.
pub(crate) fn nearest(mut neighbors: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    neighbors.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    neighbors.truncate(k);
    neighbors
}
