//! # Pagewise
//!
//! Incremental document indexing and retrieval-augmented answering over a
//! local folder of PDF and Markdown files.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌─────────┐   ┌──────────────┐
//! │ data/    │──▶│  Extract  │──▶│  Chunk  │──▶│ Embed + Store│
//! │ tracker  │   │ text/table│   │ overlap │   │   (SQLite)   │
//! └──────────┘   └───────────┘   └─────────┘   └──────┬───────┘
//!                                                     │
//!                       ┌─────────────────────────────┘
//!                       ▼
//!                ┌─────────────┐   ┌──────────────┐
//!                │  Retrieve   │──▶│   Compose    │──▶ Ollama / Gemini
//!                │  k nearest  │   │ prompt+extra │
//!                └─────────────┘   └──────────────┘
//! ```
//!
//! Callers use two operations on [`Pagewise`]: [`Pagewise::index_documents`]
//! and [`Pagewise::answer`].
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`scan`] | Data folder listing and fingerprints |
//! | [`tracker`] | Change detection against the persisted status |
//! | [`extract`] | PDF / Markdown text and table extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding backends and vector utilities |
//! | [`store`] | Vector collection (SQLite, in-memory) |
//! | [`index`] | Incremental indexing pass |
//! | [`retrieve`] | Nearest-chunk retrieval |
//! | [`external`] | General-knowledge decision and lookups |
//! | [`llm`] | Language-model backends |
//! | [`compose`] | Prompt assembly and answer post-processing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod compose;
pub mod config;
pub mod db;
pub mod embedding;
pub mod external;
pub mod extract;
pub mod index;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod scan;
pub mod store;
pub mod tracker;

use anyhow::{bail, Context, Result};
use std::sync::Arc;

use crate::compose::AnswerComposer;
use crate::config::Config;
use crate::embedding::{create_embedder, embed_query, Embedder};
use crate::external::{build_lookup, KnowledgeLookup};
use crate::index::Indexer;
use crate::llm::{create_backend, LanguageModel};
use crate::models::{IndexReport, RetrievalResult};
use crate::retrieve::Retriever;
use crate::store::{SqliteStore, VectorStore};

/// The indexing and answering pipeline for one data folder.
///
/// One embedder instance is shared by indexing and retrieval so query and
/// chunk vectors always come from the same model.
pub struct Pagewise {
    indexer: Indexer,
    composer: AnswerComposer,
    store: Arc<dyn VectorStore>,
}

impl Pagewise {
    /// Build the pipeline described by `config`: embedder, SQLite store,
    /// backend and knowledge lookups.
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let embedder = create_embedder(&config.embedding)?;
        let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::open(&config.db.path).await?);
        let backend = create_backend(&config.llm)?;
        let lookup = Box::new(build_lookup(&config.external));
        Self::from_parts(config, embedder, store, backend, lookup).await
    }

    /// Assemble the pipeline from explicit components.
    ///
    /// Performs a probe embedding; an embedder that cannot embed fails here
    /// rather than halfway through an indexing pass.
    pub async fn from_parts(
        config: Config,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        backend: Arc<dyn LanguageModel>,
        lookup: Box<dyn KnowledgeLookup>,
    ) -> Result<Self> {
        probe_embedder(embedder.as_ref()).await?;

        let indexer = Indexer::new(
            Arc::clone(&embedder),
            Arc::clone(&store),
            config.data.clone(),
            config.chunking.clone(),
        );
        let retriever = Retriever::new(embedder, Arc::clone(&store), config.retrieval.clone());
        let composer = AnswerComposer::new(
            retriever,
            backend,
            lookup,
            config.answer.clone(),
            config.external.clone(),
        );

        Ok(Self {
            indexer,
            composer,
            store,
        })
    }

    /// Bring the vector collection in line with the data folder.
    pub async fn index_documents(&mut self) -> Result<IndexReport> {
        self.indexer.run().await
    }

    /// Answer a natural-language question from the indexed documents.
    pub async fn answer(&self, query: &str) -> Result<String> {
        self.composer.answer(query).await
    }

    /// The `k` nearest chunks for `query`, without calling a backend.
    pub async fn search(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        self.composer.retriever().retrieve(query, k).await
    }

    /// Sources that currently have chunks in the collection.
    pub async fn indexed_sources(&self) -> Result<Vec<String>> {
        self.store.sources().await
    }
}

async fn probe_embedder(embedder: &dyn Embedder) -> Result<()> {
    let vector = embed_query(embedder, "probe")
        .await
        .with_context(|| format!("Embedding model '{}' is not usable", embedder.model_name()))?;
    if vector.is_empty() {
        bail!("Embedding model '{}' returned an empty vector", embedder.model_name());
    }
    if vector.len() != embedder.dims() {
        tracing::warn!(
            model = embedder.model_name(),
            expected = embedder.dims(),
            actual = vector.len(),
            "embedding dimensionality differs from configuration"
        );
    }
    tracing::info!(model = embedder.model_name(), dims = vector.len(), "embedder ready");
    Ok(())
}
