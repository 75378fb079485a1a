//! OpenAI adapters: the embeddings gateway and the Responses API language
//! model.
//!
//! Both share one [`OpenAIClient`] that owns the HTTP client (with the
//! configured timeout), the API key, and the retry policy.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use ragline_core::embedding::{check_batch, Embedder};
use ragline_core::models::EmbeddingVector;
use ragline_core::synthesize::{ChatMessage, CompletionParams, LanguageModel};

use crate::config::OpenAIConfig;

/// Failures talking to the OpenAI API.
#[derive(Debug, Error)]
pub enum OpenAIError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("OpenAI API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid OpenAI response: {0}")]
    Parse(String),
    #[error("OpenAI not configured: {0}")]
    NotConfigured(String),
}

impl OpenAIError {
    fn is_retryable(&self) -> bool {
        match self {
            OpenAIError::Http(_) => true,
            OpenAIError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Authenticated HTTP client for the OpenAI REST API.
#[derive(Clone)]
pub struct OpenAIClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
}

impl OpenAIClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OpenAIError::NotConfigured`] when no API key is available.
    pub fn new(config: &OpenAIConfig) -> std::result::Result<Self, OpenAIError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| OpenAIError::NotConfigured("OPENAI_API_KEY not set".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }

    /// POST a JSON body to `path`, retrying transient failures.
    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<Value, OpenAIError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.send_once(&url, body).await {
                Ok(json) => return Ok(json),
                Err(e) if e.is_retryable() => {
                    warn!(url = %url, attempt, error = %e, "OpenAI request failed, retrying");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| OpenAIError::Parse("request failed after retries".into())))
    }

    async fn send_once<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> std::result::Result<Value, OpenAIError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body_text = response.text().await.unwrap_or_default();
        Err(OpenAIError::Api {
            status: status.as_u16(),
            body: body_text,
        })
    }
}

// ============ Embeddings ============

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

/// [`Embedder`] backed by `POST /v1/embeddings`.
pub struct OpenAIEmbedder {
    client: OpenAIClient,
    model: String,
    dims: usize,
}

impl OpenAIEmbedder {
    pub fn new(client: OpenAIClient, config: &OpenAIConfig) -> Self {
        Self {
            client,
            model: config.embedding_model.clone(),
            dims: config.embedding_dims,
        }
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, batch_size = texts.len(), "embedding batch");

        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dims,
        };
        let json = self.client.post_json("embeddings", &body).await?;
        let vectors = parse_embeddings(&json)?;
        check_batch(&vectors, texts.len(), self.dims)?;
        Ok(vectors)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
pub fn parse_embeddings(json: &Value) -> std::result::Result<Vec<EmbeddingVector>, OpenAIError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| OpenAIError::Parse("missing data array".into()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| OpenAIError::Parse("missing embedding".into()))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);

        let vector = embedding
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| OpenAIError::Parse("non-numeric embedding value".into()))
            })
            .collect::<std::result::Result<Vec<f32>, _>>()?;
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Responses API ============

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a [ChatMessage],
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ResponsesReply {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Deserialize)]
struct OutputContent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// [`LanguageModel`] backed by `POST /v1/responses`.
pub struct OpenAIResponses {
    client: OpenAIClient,
}

impl OpenAIResponses {
    pub fn new(client: OpenAIClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LanguageModel for OpenAIResponses {
    fn name(&self) -> &str {
        "openai-responses"
    }

    async fn complete(&self, messages: &[ChatMessage], params: &CompletionParams) -> Result<String> {
        let body = ResponsesRequest {
            model: &params.model_id,
            input: messages,
            max_output_tokens: params.max_output_tokens,
            temperature: params.temperature,
        };
        let json = self.client.post_json("responses", &body).await?;
        Ok(extract_output_text(json)?)
    }
}

/// Concatenate every `output_text` part of a Responses API reply.
pub fn extract_output_text(json: Value) -> std::result::Result<String, OpenAIError> {
    let reply: ResponsesReply =
        serde_json::from_value(json).map_err(|e| OpenAIError::Parse(e.to_string()))?;

    if let Some(text) = reply.output_text.filter(|t| !t.is_empty()) {
        return Ok(text);
    }

    let text: String = reply
        .output
        .iter()
        .filter(|item| item.kind == "message")
        .flat_map(|item| item.content.iter())
        .filter(|c| c.kind == "output_text")
        .filter_map(|c| c.text.as_deref())
        .collect();

    if text.is_empty() {
        return Err(OpenAIError::Parse("response has no output_text".into()));
    }
    Ok(text)
}
