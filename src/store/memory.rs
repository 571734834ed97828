//! In-memory [`VectorStore`] for tests and throwaway sessions.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`; search is brute-force cosine
//! distance over all stored vectors.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{nearest, Neighbor, VectorRecord, VectorStore};
use crate::embedding::cosine_distance;
use crate::models::StoredChunk;

struct Entry {
    ordinal: usize,
    hash: String,
    chunk: StoredChunk,
    vector: Vec<f32>,
}

#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let mut entries = self.write()?;
        for record in records {
            let chunk = &record.chunk;
            entries.insert(
                chunk.id.clone(),
                Entry {
                    ordinal: chunk.ordinal,
                    hash: chunk.hash.clone(),
                    chunk: StoredChunk {
                        id: chunk.id.clone(),
                        text: chunk.text.clone(),
                        metadata: chunk.metadata.clone(),
                    },
                    vector: record.vector.clone(),
                },
            );
        }
        Ok(())
    }

    async fn delete_source(&self, source: &str) -> Result<usize> {
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|_, e| e.chunk.metadata.source != source);
        Ok(before - entries.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let entries = self.read()?;
        let neighbors = entries
            .values()
            .map(|e| Neighbor {
                chunk: e.chunk.clone(),
                distance: cosine_distance(vector, &e.vector),
            })
            .collect();
        Ok(nearest(neighbors, k))
    }

    async fn ids_for_source(&self, source: &str) -> Result<Vec<String>> {
        let entries = self.read()?;
        let mut owned: Vec<(usize, String)> = entries
            .values()
            .filter(|e| e.chunk.metadata.source == source)
            .map(|e| (e.ordinal, e.chunk.id.clone()))
            .collect();
        owned.sort();
        Ok(owned.into_iter().map(|(_, id)| id).collect())
    }

    async fn sources(&self) -> Result<Vec<String>> {
        let entries = self.read()?;
        let mut sources: Vec<String> = entries
            .values()
            .map(|e| e.chunk.metadata.source.clone())
            .collect();
        sources.sort();
        sources.dedup();
        Ok(sources)
    }

    async fn vectors_by_hash(&self, source: &str) -> Result<HashMap<String, Vec<f32>>> {
        let entries = self.read()?;
        Ok(entries
            .values()
            .filter(|e| e.chunk.metadata.source == source)
            .map(|e| (e.hash.clone(), e.vector.clone()))
            .collect())
    }
}
