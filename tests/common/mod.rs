//! Shared fixtures for the integration tests: a deterministic embedder,
//! a scripted language model and a counting knowledge lookup.

#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pagewise::config::Config;
use pagewise::embedding::Embedder;
use pagewise::external::KnowledgeLookup;
use pagewise::llm::{BackendError, LanguageModel};
use pagewise::store::{SqliteStore, VectorStore};
use pagewise::Pagewise;
use tempfile::TempDir;

pub const DIMS: usize = 64;

/// Bag-of-words hashing embedder: identical texts map to identical vectors
/// and texts sharing words point in similar directions.
pub struct BagOfWordsEmbedder;

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        v[(hasher.finish() % DIMS as u64) as usize] += 1.0;
    }
    v
}

/// Embedder that always fails, for probe tests.
pub struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    fn model_name(&self) -> &str {
        "broken"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("model not loaded")
    }
}

/// Bag-of-words embedder that counts embedded texts and can start failing
/// after a number of successful calls.
pub struct CountingEmbedder {
    texts: AtomicUsize,
    calls: AtomicUsize,
    ok_calls: Option<usize>,
}

impl CountingEmbedder {
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    /// Succeeds for the first `n` calls, then fails every time.
    pub fn failing_after(n: usize) -> Arc<Self> {
        Self::build(Some(n))
    }

    fn build(ok_calls: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            texts: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            ok_calls,
        })
    }

    pub fn texts_embedded(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn model_name(&self) -> &str {
        "counting"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.ok_calls.is_some_and(|n| call >= n) {
            anyhow::bail!("embedding service went away");
        }
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

/// Returns a fixed reply (or error) and records every prompt it receives.
pub struct ScriptedBackend {
    reply: Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedBackend {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(message) => Err(BackendError::UnexpectedResponse(message.clone())),
        }
    }
}

/// Lookup returning a fixed snippet and counting calls.
pub struct CountingLookup {
    snippet: Option<String>,
    pub calls: Arc<AtomicUsize>,
}

impl CountingLookup {
    pub fn new(snippet: Option<&str>) -> (Box<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let lookup = Box::new(Self {
            snippet: snippet.map(str::to_string),
            calls: Arc::clone(&calls),
        });
        (lookup, calls)
    }
}

#[async_trait]
impl KnowledgeLookup for CountingLookup {
    async fn lookup(&self, _query: &str) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.snippet.clone()
    }
}

/// Temp workspace with a `data/` folder and a config pointing into it.
pub struct TestEnv {
    pub tmp: TempDir,
    pub config: Config,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data.folder = tmp.path().join("data");
        config.data.status_path = tmp.path().join("state").join("status.json");
        config.db.path = tmp.path().join("store").join("pagewise.sqlite");
        config.external.wikipedia_enabled = false;
        std::fs::create_dir_all(&config.data.folder).unwrap();
        Self { tmp, config }
    }

    pub fn data(&self) -> &Path {
        &self.config.data.folder
    }

    pub fn write(&self, name: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.data().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    pub async fn store(&self) -> Arc<SqliteStore> {
        Arc::new(SqliteStore::open(&self.config.db.path).await.unwrap())
    }

    /// Open a pipeline over this env with the given backend and lookup.
    pub async fn open_with(
        &self,
        backend: Arc<ScriptedBackend>,
        lookup: Box<dyn KnowledgeLookup>,
    ) -> (Pagewise, Arc<SqliteStore>) {
        self.open_full(Arc::new(BagOfWordsEmbedder), backend, lookup).await
    }

    /// Open a pipeline with every component supplied by the caller.
    pub async fn open_full(
        &self,
        embedder: Arc<dyn Embedder>,
        backend: Arc<ScriptedBackend>,
        lookup: Box<dyn KnowledgeLookup>,
    ) -> (Pagewise, Arc<SqliteStore>) {
        let store = self.store().await;
        let pipeline = Pagewise::from_parts(
            self.config.clone(),
            embedder,
            store.clone() as Arc<dyn VectorStore>,
            backend,
            lookup,
        )
        .await
        .unwrap();
        (pipeline, store)
    }

    pub async fn open(&self) -> (Pagewise, Arc<SqliteStore>) {
        let (lookup, _) = CountingLookup::new(None);
        self.open_with(ScriptedBackend::replying("ok"), lookup).await
    }
}

/// Minimal single-page PDF whose content stream shows `phrase`.
/// Body first, then an xref with correct byte offsets so pdf-extract can parse it.
pub fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            stream.len(),
            stream
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}
