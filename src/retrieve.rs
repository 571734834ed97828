//! Similarity retrieval over the vector collection.
//!
//! The [`Retriever`] embeds a query with the same [`Embedder`] the indexer
//! used and asks the [`VectorStore`] for its nearest chunks. Far results are
//! never filtered out; the mean distance is only reported as a quality
//! signal.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::embedding::{embed_query, Embedder};
use crate::models::{ContentKind, RetrievalResult, RetrievedChunk};
use crate::store::VectorStore;

const EXCERPT_CHARS: usize = 300;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// The `k` chunks closest to `query`, closest first.
    ///
    /// An empty collection yields an empty result without calling the
    /// embedder.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        let total = self.store.count().await?;
        if total == 0 || k == 0 {
            tracing::debug!(total, k, "nothing to retrieve");
            return Ok(RetrievalResult::default());
        }

        let vector = embed_query(self.embedder.as_ref(), query)
            .await
            .context("Failed to embed query")?;
        let neighbors = self.store.query(&vector, k.min(total)).await?;

        let result = RetrievalResult {
            items: neighbors
                .into_iter()
                .map(|n| RetrievedChunk {
                    chunk: n.chunk,
                    distance: n.distance,
                })
                .collect(),
        };

        if let Some(mean) = result.mean_distance() {
            tracing::info!(count = result.len(), mean_distance = mean, "retrieved chunks");
            if mean > self.config.low_relevance_distance {
                tracing::warn!(
                    mean_distance = mean,
                    threshold = self.config.low_relevance_distance,
                    "retrieved chunks look weakly related to the query"
                );
            }
        }

        if self.config.debug_chunks {
            log_chunks(&result);
        }

        Ok(result)
    }

    /// Number of chunks currently in the collection.
    pub async fn collection_size(&self) -> Result<usize> {
        self.store.count().await
    }

    /// Retrieve with the configured `retrieval.k`.
    pub async fn retrieve_default(&self, query: &str) -> Result<RetrievalResult> {
        self.retrieve(query, self.config.k).await
    }
}

fn log_chunks(result: &RetrievalResult) {
    for (i, item) in result.items.iter().enumerate() {
        let meta = &item.chunk.metadata;
        let body = match meta.kind {
            ContentKind::Table => item.chunk.text.clone(),
            ContentKind::Text => excerpt(&item.chunk.text, EXCERPT_CHARS),
        };
        tracing::debug!(
            rank = i + 1,
            source = %meta.source,
            page = meta.page,
            kind = %meta.kind,
            distance = item.distance,
            "{}",
            body
        );
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}
