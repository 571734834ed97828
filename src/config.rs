//! TOML configuration for the indexing and answering pipeline.
//!
//! Every section carries defaults, so an empty file (or no file at all, via
//! [`Config::default`]) yields a working local setup: fastembed embeddings,
//! an Ollama backend on localhost, and the `data/` folder as the corpus.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub external: ExternalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    #[serde(default = "default_data_folder")]
    pub folder: PathBuf,
    #[serde(default = "default_status_path")]
    pub status_path: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            folder: default_data_folder(),
            status_path: default_status_path(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_data_folder() -> PathBuf {
    PathBuf::from("data")
}
fn default_status_path() -> PathBuf {
    PathBuf::from("processed_files_status.json")
}
fn default_include_globs() -> Vec<String> {
    vec![
        "*.pdf".to_string(),
        "*.md".to_string(),
        "*.markdown".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("pagewise_store/pagewise.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_size_chars")]
    pub size_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size_chars: default_size_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_size_chars() -> usize {
    768
}
fn default_overlap_chars() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    /// Mean distance above which retrieval is logged as weakly relevant.
    #[serde(default = "default_low_relevance_distance")]
    pub low_relevance_distance: f32,
    #[serde(default)]
    pub debug_chunks: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            low_relevance_distance: default_low_relevance_distance(),
            debug_chunks: false,
        }
    }
}

fn default_k() -> usize {
    5
}
fn default_low_relevance_distance() -> f32 {
    0.8
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_llm_host")]
    pub host: String,
    /// Gemini API key. Empty means read `GOOGLE_API_KEY` from the environment.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            host: default_llm_host(),
            api_key: String::new(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "ollama".to_string()
}
fn default_llm_host() -> String {
    "http://localhost:11434".to_string()
}
fn default_max_output_tokens() -> u32 {
    1024
}
fn default_llm_timeout_secs() -> u64 {
    120
}

/// How strongly the prompt asks the model to cite sources.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CitationMode {
    #[default]
    Required,
    BestEffort,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AnswerConfig {
    #[serde(default)]
    pub citation_mode: CitationMode,
}

/// A built-in concept explanation served by the glossary lookup.
#[derive(Debug, Deserialize, Clone)]
pub struct GlossaryEntry {
    pub term: String,
    pub lines: Vec<String>,
    pub source: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExternalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub augment: bool,
    #[serde(default = "default_min_chunks_threshold")]
    pub min_chunks_threshold: usize,
    #[serde(default = "default_conceptual_keywords")]
    pub conceptual_keywords: Vec<String>,
    #[serde(default = "default_specific_context_keywords")]
    pub specific_context_keywords: Vec<String>,
    #[serde(default = "default_usage_markers")]
    pub usage_markers: Vec<String>,
    #[serde(default = "default_indicator")]
    pub indicator: String,
    #[serde(default = "default_usage_banner")]
    pub usage_banner: String,
    #[serde(default = "default_disclaimer")]
    pub disclaimer: String,
    #[serde(default = "default_true")]
    pub wikipedia_enabled: bool,
    #[serde(default = "default_wikipedia_language")]
    pub wikipedia_language: String,
    #[serde(default = "default_glossary")]
    pub glossary: Vec<GlossaryEntry>,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            augment: true,
            min_chunks_threshold: default_min_chunks_threshold(),
            conceptual_keywords: default_conceptual_keywords(),
            specific_context_keywords: default_specific_context_keywords(),
            usage_markers: default_usage_markers(),
            indicator: default_indicator(),
            usage_banner: default_usage_banner(),
            disclaimer: default_disclaimer(),
            wikipedia_enabled: true,
            wikipedia_language: default_wikipedia_language(),
            glossary: default_glossary(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_min_chunks_threshold() -> usize {
    3
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_conceptual_keywords() -> Vec<String> {
    strings(&[
        "what is",
        "what are",
        "what does",
        "define",
        "definition",
        "meaning of",
        "concept",
        "explain",
        "how is calculated",
        "how to calculate",
        "difference between",
    ])
}

fn default_specific_context_keywords() -> Vec<String> {
    strings(&[
        "according to",
        "in the document",
        "this document",
        "the notice",
        "the call for applications",
        "deadline",
        "due date",
        "enrollment",
        "schedule",
        "this program",
    ])
}

fn default_usage_markers() -> Vec<String> {
    strings(&[
        "in general",
        "generally",
        "by definition",
        "is defined as",
        "commonly",
        "typically",
        "usually",
        "in broad terms",
        "general knowledge",
    ])
}

fn default_indicator() -> String {
    "🌐 **EXTERNAL SOURCE**\nThe following complements the documents with general knowledge.\n---"
        .to_string()
}
fn default_usage_banner() -> String {
    "🌐 **GENERAL KNOWLEDGE USED**\nThis answer includes general knowledge that is not taken from the indexed documents.\n---"
        .to_string()
}
fn default_disclaimer() -> String {
    "⚠️ **IMPORTANT:** Complementary information does not replace the official documents; always confirm specific details there."
        .to_string()
}
fn default_wikipedia_language() -> String {
    "en".to_string()
}

fn default_glossary() -> Vec<GlossaryEntry> {
    vec![
        GlossaryEntry {
            term: "per capita income".to_string(),
            lines: strings(&[
                "Per capita income is the total income of a household or group divided by the number of people in it.",
                "Formula: per capita income = sum of all incomes ÷ number of people.",
                "Example: a family of 4 with a total income of 3,000 has a per capita income of 750.",
            ]),
            source: "Basic economics concept".to_string(),
        },
        GlossaryEntry {
            term: "gross income".to_string(),
            lines: strings(&[
                "Gross income is the total amount received before taxes, contributions or other deductions.",
                "It differs from net income, which is the amount left after deductions.",
            ]),
            source: "Basic economics concept".to_string(),
        },
        GlossaryEntry {
            term: "minimum wage".to_string(),
            lines: strings(&[
                "The minimum wage is the lowest pay an employer may legally pay a worker.",
                "It sets a floor intended to guarantee minimum living conditions.",
            ]),
            source: "Labour concept".to_string(),
        },
        GlossaryEntry {
            term: "quota".to_string(),
            lines: strings(&[
                "A quota system is an affirmative-action policy that reserves places for specific groups.",
                "Quotas may be based on income, ethnicity, disability or public-school attendance.",
            ]),
            source: "Public policy concept".to_string(),
        },
    ]
}

impl EmbeddingConfig {
    pub fn model_or_default(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| match self.provider.as_str() {
                "openai" => "text-embedding-3-small".to_string(),
                "ollama" => "nomic-embed-text".to_string(),
                _ => "all-minilm-l6-v2".to_string(),
            })
    }
}

impl Config {
    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.size_chars == 0 {
            bail!("chunking.size_chars must be > 0");
        }
        if self.chunking.overlap_chars >= self.chunking.size_chars {
            bail!(
                "chunking.overlap_chars ({}) must be smaller than chunking.size_chars ({})",
                self.chunking.overlap_chars,
                self.chunking.size_chars
            );
        }
        if self.retrieval.k == 0 {
            bail!("retrieval.k must be >= 1");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be >= 1");
        }
        if self.data.include_globs.is_empty() {
            bail!("data.include_globs must not be empty");
        }

        match self.embedding.provider.as_str() {
            "local" | "ollama" | "openai" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be local, ollama, or openai.",
                other
            ),
        }

        match self.llm.provider.as_str() {
            "ollama" | "gemini" => {}
            other => bail!(
                "Unknown LLM provider: '{}'. Must be ollama or gemini.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
