//! Embedding providers.
//!
//! [`HashingEmbedder`] is an offline, deterministic default. [`HttpEmbeddingClient`]
//! talks to Voyage AI or any OpenAI-compatible `/embeddings` endpoint, using
//! `input_type: "document"` for indexing and `"query"` for searching where
//! the API supports it.

use std::sync::Arc;

use async_trait::async_trait;
use codesense_core::{CodesenseError, EmbeddingConfig, EmbeddingProviderKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Turns text into fixed-dimension vectors.
///
/// `embed` returns one vector per input, in input order, all of the same
/// length. The builder checks both properties and fails the build if a
/// provider breaks them.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier recorded in the snapshot. Vectors from different ids are
    /// never mixed in one index.
    fn model_id(&self) -> &str;

    /// Embed a batch of documents.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CodesenseError>;

    /// Embed a search query.
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, CodesenseError> {
        self.embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CodesenseError::Embedding("provider returned no vector".into()))
    }
}

/// Build the provider a configuration asks for.
///
/// `model_override` replaces the configured model, e.g. the model id
/// recorded in an existing snapshot.
///
/// # Errors
///
/// Returns [`CodesenseError::Config`] when an HTTP provider has no API key or
/// a hashing model id is malformed.
pub fn provider_from_config(
    config: &EmbeddingConfig,
    model_override: Option<&str>,
) -> Result<Arc<dyn EmbeddingProvider>, CodesenseError> {
    let model = model_override
        .map(String::from)
        .unwrap_or_else(|| config.model_name());
    // A hashing model id is self-describing and needs no provider config.
    if let Some(dimensions) = HashingEmbedder::parse_model_id(&model) {
        return Ok(Arc::new(HashingEmbedder::new(dimensions)));
    }
    match config.provider {
        EmbeddingProviderKind::Hashing => Err(CodesenseError::Config(format!(
            "hashing model must look like 'hashing-<dimensions>', got '{model}'"
        ))),
        EmbeddingProviderKind::Voyage | EmbeddingProviderKind::OpenAi => {
            let client = HttpEmbeddingClient::with_config(config)?.with_model(&model);
            Ok(Arc::new(client))
        }
    }
}

/// Deterministic signed feature hashing over identifier sub-tokens.
///
/// Identifiers are split on non-alphanumerics, `snake_case` and
/// `camelCase` boundaries. Each token is hashed with SHA-256 into one
/// signed bucket, and the result is L2-normalized. Similar vocabulary gives
/// nearby vectors, which is enough for local, offline search.
///
/// # Examples
///
/// ```
/// use codesense_lens::embedding::HashingEmbedder;
///
/// let embedder = HashingEmbedder::new(64);
/// let v = embedder.embed_text("parse_config file");
/// assert_eq!(v.len(), 64);
/// let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
/// assert!((norm - 1.0).abs() < 1e-4);
/// ```
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model_id: format!("hashing-{dimensions}"),
        }
    }

    /// Dimension encoded in a `hashing-<n>` model id.
    pub fn parse_model_id(model_id: &str) -> Option<usize> {
        model_id
            .strip_prefix("hashing-")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n > 0)
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CodesenseError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Lowercased words plus their `snake_case` / `camelCase` parts.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
    {
        let lower = word.to_lowercase();
        let parts = split_identifier(word);
        if parts.len() > 1 {
            tokens.extend(parts);
        }
        tokens.push(lower);
    }
    tokens
}

fn split_identifier(word: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for piece in word.split('_').filter(|p| !p.is_empty()) {
        let mut current = String::new();
        let mut prev_lower = false;
        for c in piece.chars() {
            if c.is_uppercase() && prev_lower && !current.is_empty() {
                parts.push(current.to_lowercase());
                current.clear();
            }
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            current.push(c);
        }
        if !current.is_empty() {
            parts.push(current.to_lowercase());
        }
    }
    parts
}

const VOYAGE_BASE_URL: &str = "https://api.voyageai.com/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const BATCH_DELAY_MS: u64 = 200;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    input_type: Option<&'static str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDataItem>,
}

#[derive(Deserialize)]
struct EmbedDataItem {
    embedding: Vec<f32>,
    index: Option<usize>,
}

/// Client for Voyage AI and OpenAI-compatible embedding APIs.
///
/// # Examples
///
/// ```
/// use codesense_core::EmbeddingProviderKind;
/// use codesense_lens::embedding::HttpEmbeddingClient;
///
/// let client = HttpEmbeddingClient::new(EmbeddingProviderKind::Voyage, "test-key");
/// assert_eq!(client.model(), "voyage-code-3");
/// ```
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    provider: EmbeddingProviderKind,
    api_key: String,
    base_url: String,
    model: String,
    batch_size: usize,
}

impl std::fmt::Debug for HttpEmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbeddingClient")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl HttpEmbeddingClient {
    /// Client with the provider's default URL and model.
    pub fn new(provider: EmbeddingProviderKind, api_key: &str) -> Self {
        let defaults = EmbeddingConfig {
            provider,
            ..EmbeddingConfig::default()
        };
        Self {
            client: reqwest::Client::new(),
            provider,
            api_key: api_key.to_string(),
            base_url: default_base_url(provider).to_string(),
            model: defaults.model_name(),
            batch_size: defaults.batch_size,
        }
    }

    /// Create a client from an [`EmbeddingConfig`].
    ///
    /// Falls back to `VOYAGE_API_KEY` or `OPENAI_API_KEY` if no key is configured.
    ///
    /// # Errors
    ///
    /// Returns [`CodesenseError::Config`] if no API key is available.
    pub fn with_config(config: &EmbeddingConfig) -> Result<Self, CodesenseError> {
        let env_var = api_key_env_var(config.provider);
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(env_var).ok())
            .ok_or_else(|| {
                CodesenseError::Config(format!(
                    "embedding API key not found: set embedding.api_key in .codesense.toml or {env_var}"
                ))
            })?;

        Ok(Self {
            client: reqwest::Client::new(),
            provider: config.provider,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base_url(config.provider).to_string()),
            model: config.model_name(),
            batch_size: config.batch_size.max(1),
        })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn input_type(&self, input_type: &'static str) -> Option<&'static str> {
        match self.provider {
            EmbeddingProviderKind::Voyage => Some(input_type),
            _ => None,
        }
    }

    async fn request(
        &self,
        input: &[String],
        input_type: &'static str,
    ) -> Result<Vec<Vec<f32>>, CodesenseError> {
        let request = EmbedRequest {
            model: &self.model,
            input,
            input_type: self.input_type(input_type),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CodesenseError::Embedding(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".into());
            return Err(CodesenseError::Embedding(format!(
                "{} API returned {status}: {body}",
                self.provider
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| CodesenseError::Embedding(format!("failed to parse response: {e}")))?;
        Ok(ordered_embeddings(parsed))
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CodesenseError> {
        let mut all = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(tokio::time::Duration::from_millis(BATCH_DELAY_MS)).await;
            }
            log::debug!("embedding batch {} ({} texts)", i + 1, batch.len());
            all.extend(self.request(batch, "document").await?);
        }
        Ok(all)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, CodesenseError> {
        self.request(&[query.to_string()], "query")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                CodesenseError::Embedding(format!("empty response from {} API", self.provider))
            })
    }
}

/// Responses may list items out of order; `index` is authoritative when present.
fn ordered_embeddings(response: EmbedResponse) -> Vec<Vec<f32>> {
    let mut items = response.data;
    if items.iter().all(|item| item.index.is_some()) {
        items.sort_by_key(|item| item.index);
    }
    items.into_iter().map(|item| item.embedding).collect()
}

fn default_base_url(provider: EmbeddingProviderKind) -> &'static str {
    match provider {
        EmbeddingProviderKind::OpenAi => OPENAI_BASE_URL,
        _ => VOYAGE_BASE_URL,
    }
}

fn api_key_env_var(provider: EmbeddingProviderKind) -> &'static str {
    match provider {
        EmbeddingProviderKind::OpenAi => "OPENAI_API_KEY",
        _ => "VOYAGE_API_KEY",
    }
}
