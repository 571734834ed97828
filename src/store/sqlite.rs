//! SQLite-backed [`VectorStore`].
//!
//! Vectors are stored as little-endian f32 BLOBs next to the chunk text and
//! metadata. Queries load every vector and rank by cosine distance in Rust,
//! which is fine for the folder-sized corpora this crate targets.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;

use super::{nearest, Neighbor, VectorRecord, VectorStore};
use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::models::{ChunkMetadata, ContentKind, StoredChunk};
use crate::{db, migrate};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the collection at `path` and apply the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for record in records {
            let chunk = &record.chunk;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source, page, kind, ordinal, text, hash, vector, dims, indexed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    source = excluded.source,
                    page = excluded.page,
                    kind = excluded.kind,
                    ordinal = excluded.ordinal,
                    text = excluded.text,
                    hash = excluded.hash,
                    vector = excluded.vector,
                    dims = excluded.dims,
                    indexed_at = excluded.indexed_at
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.metadata.source)
            .bind(chunk.metadata.page as i64)
            .bind(chunk.metadata.kind.as_str())
            .bind(chunk.ordinal as i64)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(vec_to_blob(&record.vector))
            .bind(record.vector.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_source(&self, source: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks WHERE source = ?")
            .bind(source)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT id, source, page, kind, text, vector FROM chunks")
            .fetch_all(&self.pool)
            .await?;

        let neighbors = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vector");
                let page: i64 = row.get("page");
                let kind: String = row.get("kind");
                Neighbor {
                    distance: cosine_distance(vector, &blob_to_vec(&blob)),
                    chunk: StoredChunk {
                        id: row.get("id"),
                        text: row.get("text"),
                        metadata: ChunkMetadata {
                            source: row.get("source"),
                            page: page.max(0) as u32,
                            kind: ContentKind::parse(&kind).unwrap_or(ContentKind::Text),
                        },
                    },
                }
            })
            .collect();

        Ok(nearest(neighbors, k))
    }

    async fn ids_for_source(&self, source: &str) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM chunks WHERE source = ? ORDER BY ordinal")
            .bind(source)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn sources(&self) -> Result<Vec<String>> {
        let sources: Vec<String> = sqlx::query_scalar("SELECT DISTINCT source FROM chunks ORDER BY source")
            .fetch_all(&self.pool)
            .await?;
        Ok(sources)
    }

    async fn vectors_by_hash(&self, source: &str) -> Result<HashMap<String, Vec<f32>>> {
        let rows = sqlx::query("SELECT hash, vector FROM chunks WHERE source = ?")
            .bind(source)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let hash: String = row.get("hash");
                let blob: Vec<u8> = row.get("vector");
                (hash, blob_to_vec(&blob))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{chunk_id, Chunk};
    use tempfile::TempDir;

    fn record(source: &str, ordinal: usize, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            chunk: Chunk {
                id: chunk_id(source, ordinal),
                ordinal,
                text: format!("{} chunk {}", source, ordinal),
                hash: "h".to_string(),
                metadata: ChunkMetadata {
                    source: source.to_string(),
                    page: 2,
                    kind: ContentKind::Table,
                },
            },
            vector,
        }
    }

    async fn open_store(tmp: &TempDir) -> SqliteStore {
        SqliteStore::open(&tmp.path().join("store").join("chunks.sqlite"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store.upsert(&[record("a.md", 0, vec![1.0, 0.0])]).await.unwrap();
        store.upsert(&[record("a.md", 0, vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        let hits = store.query(&[0.0, 1.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].distance.abs() < 1e-6);
        assert_eq!(hits[0].chunk.metadata.page, 2);
        assert_eq!(hits[0].chunk.metadata.kind, ContentKind::Table);
    }

    #[tokio::test]
    async fn test_delete_source_and_ids() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store
            .upsert(&[
                record("a.md", 0, vec![1.0, 0.0]),
                record("a.md", 1, vec![1.0, 1.0]),
                record("b.pdf", 0, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(store.ids_for_source("a.md").await.unwrap(), vec!["a.md_0", "a.md_1"]);
        assert_eq!(store.sources().await.unwrap(), vec!["a.md", "b.pdf"]);
        assert_eq!(store.delete_source("a.md").await.unwrap(), 2);
        assert_eq!(store.delete_source("a.md").await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_query_orders_ascending_and_caps_at_count() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store
            .upsert(&[
                record("far.md", 0, vec![-1.0, 0.0]),
                record("near.md", 0, vec![1.0, 0.1]),
                record("mid.md", 0, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = store.query(&[1.0, 0.0], 10).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["near.md_0", "mid.md_0", "far.md_0"]);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));

        assert_eq!(store.query(&[1.0, 0.0], 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = open_store(&tmp).await;
            store.upsert(&[record("a.md", 0, vec![1.0])]).await.unwrap();
            store.close().await;
        }
        let store = open_store(&tmp).await;
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_vectors_by_hash_for_one_source() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        let mut second = record("a.md", 1, vec![0.0, 1.0]);
        second.chunk.hash = "h2".to_string();
        store
            .upsert(&[record("a.md", 0, vec![1.0, 0.0]), second, record("b.md", 0, vec![0.5, 0.5])])
            .await
            .unwrap();

        let vectors = store.vectors_by_hash("a.md").await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors["h"], vec![1.0, 0.0]);
        assert_eq!(vectors["h2"], vec![0.0, 1.0]);
        assert!(store.vectors_by_hash("missing.md").await.unwrap().is_empty());
    }
}
