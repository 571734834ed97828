//! General-knowledge support for conceptual questions.
//!
//! Two pieces live here:
//! - [`assess_external`] decides, lexically, whether a query may draw on
//!   knowledge outside the indexed documents.
//! - [`KnowledgeLookup`] implementations fetch a short explanatory snippet
//!   that is appended after the model's answer: a built-in [`Glossary`]
//!   first, then [`WikipediaLookup`], combined by [`ChainedLookup`].

use async_trait::async_trait;
use std::time::Duration;

use crate::config::{ExternalConfig, GlossaryEntry};
use crate::models::{DecisionReason, ExternalKnowledgeDecision};

const WIKIPEDIA_TIMEOUT_SECS: u64 = 5;
const WIKIPEDIA_MIN_EXTRACT_CHARS: usize = 50;
const WIKIPEDIA_MIN_SUMMARY_CHARS: usize = 100;
const WIKIPEDIA_SUMMARY_CHARS: usize = 300;
const WIKIPEDIA_MAX_TERMS: usize = 2;

const STOP_WORDS: &[&str] = &[
    "what", "which", "where", "when", "does", "about", "explain", "define", "with", "from",
    "that", "this", "there", "their", "have", "into", "mean", "means",
];

/// Decide whether `query` may use general knowledge.
///
/// A specific-context keyword always wins; otherwise the query needs too few
/// retrieved chunks and at least one conceptual keyword. Matching is plain
/// substring search on the lower-cased query.
pub fn assess_external(
    query: &str,
    retrieved: usize,
    config: &ExternalConfig,
) -> ExternalKnowledgeDecision {
    let query_lower = query.to_lowercase();
    let specific = first_match(&query_lower, &config.specific_context_keywords);
    let conceptual = first_match(&query_lower, &config.conceptual_keywords);
    let sufficient = retrieved >= config.min_chunks_threshold;

    let reason = if !config.enabled {
        DecisionReason::Disabled
    } else if let Some(keyword) = specific.clone() {
        DecisionReason::SpecificContext(keyword)
    } else if sufficient {
        DecisionReason::SufficientContext
    } else if let Some(keyword) = conceptual.clone() {
        DecisionReason::Conceptual(keyword)
    } else {
        DecisionReason::NotConceptual
    };
    let eligible = matches!(reason, DecisionReason::Conceptual(_));

    tracing::info!(
        chunks = retrieved,
        is_conceptual = conceptual.is_some(),
        has_specific_context = specific.is_some(),
        sufficient,
        eligible,
        "external knowledge decision"
    );

    ExternalKnowledgeDecision { eligible, reason }
}

fn first_match(haystack: &str, keywords: &[String]) -> Option<String> {
    keywords
        .iter()
        .find(|k| !k.is_empty() && haystack.contains(&k.to_lowercase()))
        .cloned()
}

#[async_trait]
pub trait KnowledgeLookup: Send + Sync {
    /// A formatted snippet about `query`, or `None` when nothing applies.
    async fn lookup(&self, query: &str) -> Option<String>;
}

/// Build the lookup chain described by `external`: glossary, then Wikipedia
/// when enabled.
pub fn build_lookup(config: &ExternalConfig) -> ChainedLookup {
    let mut chain: Vec<Box<dyn KnowledgeLookup>> =
        vec![Box::new(Glossary::new(config.glossary.clone()))];

    if config.wikipedia_enabled {
        match WikipediaLookup::new(&config.wikipedia_language) {
            Ok(wiki) => chain.push(Box::new(wiki)),
            Err(e) => tracing::warn!(error = %e, "Wikipedia lookup unavailable"),
        }
    }

    ChainedLookup::new(chain)
}

// ============ Glossary ============

/// Fixed concept explanations, matched by substring on the query.
pub struct Glossary {
    entries: Vec<GlossaryEntry>,
}

impl Glossary {
    pub fn new(entries: Vec<GlossaryEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl KnowledgeLookup for Glossary {
    async fn lookup(&self, query: &str) -> Option<String> {
        let query_lower = query.to_lowercase();
        let entry = self
            .entries
            .iter()
            .find(|e| query_lower.contains(&e.term.to_lowercase()))?;

        let mut out = format!("Context on {}:\n", entry.term);
        for line in &entry.lines {
            out.push_str("- ");
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&format!("\nSource: {}", entry.source));
        Some(out)
    }
}

// ============ Wikipedia ============

/// Page summaries from the Wikipedia REST API for the first content words
/// of the query.
pub struct WikipediaLookup {
    base_url: String,
    client: reqwest::Client,
}

struct WikiSummary {
    title: String,
    extract: String,
    url: String,
}

impl WikipediaLookup {
    pub fn new(language: &str) -> anyhow::Result<Self> {
        Self::with_base_url(&format!("https://{}.wikipedia.org/api/rest_v1", language))
    }

    pub fn with_base_url(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(WIKIPEDIA_TIMEOUT_SECS))
            .user_agent(concat!("pagewise/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn summary(&self, term: &str) -> anyhow::Result<Option<WikiSummary>> {
        let mut url = reqwest::Url::parse(&format!("{}/page/summary/", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("invalid Wikipedia base URL"))?
            .pop_if_empty()
            .push(term);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let json: serde_json::Value = response.json().await?;
        Ok(parse_summary(&json))
    }
}

fn parse_summary(json: &serde_json::Value) -> Option<WikiSummary> {
    let extract = json.get("extract")?.as_str()?;
    if extract.chars().count() <= WIKIPEDIA_MIN_EXTRACT_CHARS {
        return None;
    }
    let text = |v: Option<&serde_json::Value>| v.and_then(|v| v.as_str()).unwrap_or("").to_string();
    Some(WikiSummary {
        title: text(json.get("title")),
        extract: extract.to_string(),
        url: text(
            json.get("content_urls")
                .and_then(|c| c.get("desktop"))
                .and_then(|d| d.get("page")),
        ),
    })
}

fn render_summary(summary: &WikiSummary) -> String {
    let cut: String = summary.extract.chars().take(WIKIPEDIA_SUMMARY_CHARS).collect();
    format!(
        "Context ({}):\n{}...\n\nSource: Wikipedia - {}",
        summary.title, cut, summary.url
    )
}

/// The first query words worth looking up: longer than three characters and
/// not a stop word, with surrounding punctuation removed.
pub fn candidate_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| w.chars().count() > 3 && !STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .take(WIKIPEDIA_MAX_TERMS)
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl KnowledgeLookup for WikipediaLookup {
    async fn lookup(&self, query: &str) -> Option<String> {
        for term in candidate_terms(query) {
            match self.summary(&term).await {
                Ok(Some(summary))
                    if summary.extract.chars().count() > WIKIPEDIA_MIN_SUMMARY_CHARS =>
                {
                    return Some(render_summary(&summary));
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(term = %term, error = %e, "Wikipedia lookup failed"),
            }
        }
        None
    }
}

// ============ Chain ============

/// Tries each lookup in order; the first hit wins.
pub struct ChainedLookup {
    lookups: Vec<Box<dyn KnowledgeLookup>>,
}

impl ChainedLookup {
    pub fn new(lookups: Vec<Box<dyn KnowledgeLookup>>) -> Self {
        Self { lookups }
    }
}

#[async_trait]
impl KnowledgeLookup for ChainedLookup {
    async fn lookup(&self, query: &str) -> Option<String> {
        for lookup in &self.lookups {
            if let Some(found) = lookup.lookup(query).await {
                return Some(found);
            }
        }
        None
    }
}
