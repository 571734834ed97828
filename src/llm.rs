//! Language-model backends.
//!
//! A [`LanguageModel`] turns a fully assembled prompt into a reply. Exactly
//! one backend is chosen from `llm.provider` when the pipeline is built
//! (see [`create_backend`]); requests are single-shot with no retries.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response format: {0}")]
    UnexpectedResponse(String),
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Display name used in logs and error replies, e.g. `"Ollama"`.
    fn name(&self) -> &str;
    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;
}

/// Build the backend named by `llm.provider`.
pub fn create_backend(config: &LlmConfig) -> anyhow::Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaBackend::new(config)?)),
        "gemini" => Ok(Arc::new(GeminiBackend::new(config)?)),
        other => anyhow::bail!("Unknown LLM provider: {}", other),
    }
}

fn http_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

async fn post_json(
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<serde_json::Value, BackendError> {
    let response = request.json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}

// ============ Ollama ============

/// Non-streaming `POST {host}/api/chat` against a local Ollama server.
pub struct OllamaBackend {
    model: String,
    host: String,
    client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "llama3:latest".to_string()),
            host: config.host.trim_end_matches('/').to_string(),
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaBackend {
    fn name(&self) -> &str {
        "Ollama"
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        tracing::info!(model = %self.model, "sending prompt to Ollama");
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
        });
        let request = self.client.post(format!("{}/api/chat", self.host));
        let json = post_json(request, &body).await?;
        parse_ollama_reply(&json)
    }
}

fn parse_ollama_reply(json: &serde_json::Value) -> Result<String, BackendError> {
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| BackendError::UnexpectedResponse("missing message.content".to_string()))
}

// ============ Gemini ============

/// Google Gemini `generateContent`. The key comes from `llm.api_key` or,
/// when that is empty, `GOOGLE_API_KEY`.
pub struct GeminiBackend {
    model: String,
    api_key: String,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = if config.api_key.is_empty() {
            std::env::var("GOOGLE_API_KEY").map_err(|_| {
                anyhow::anyhow!("Gemini backend needs llm.api_key or GOOGLE_API_KEY")
            })?
        } else {
            config.api_key.clone()
        };

        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "gemini-1.5-flash".to_string()),
            api_key,
            max_output_tokens: config.max_output_tokens,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiBackend {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        tracing::info!(model = %self.model, "sending prompt to Gemini");
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "maxOutputTokens": self.max_output_tokens },
        });
        let request = self
            .client
            .post(format!("{}/models/{}:generateContent", GEMINI_API_BASE, self.model))
            .query(&[("key", self.api_key.as_str())]);
        let json = post_json(request, &body).await?;
        parse_gemini_reply(&json)
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_reply(json: &serde_json::Value) -> Result<String, BackendError> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| BackendError::UnexpectedResponse("missing candidates[0].content.parts".to_string()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.trim().is_empty() {
        return Err(BackendError::UnexpectedResponse("empty reply".to_string()));
    }
    Ok(text.trim().to_string())
}
