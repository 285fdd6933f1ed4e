//! Embedding generation trait and OpenAI implementation.
//!
//! The [`Embedder`] trait abstracts over embedding providers. The default
//! implementation [`OpenAiEmbedder`] calls the `/v1/embeddings` endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Core embedding generation interface.
///
/// All implementations must be `Send + Sync` to allow shared use across
/// async task boundaries.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding vector for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedding provider is unreachable or the
    /// request fails.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Returns the dimensionality of the embedding vectors produced.
    fn dimensions(&self) -> usize;
}

/// Errors from embedding generation.
#[derive(Debug, thiserror::Error)]
pub enum EmbedderError {
    /// HTTP transport failure.
    #[error("embedder request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Response did not match expected format.
    #[error("embedder response parse error: {0}")]
    Parse(String),

    /// Provider is unavailable.
    #[error("embedder unavailable: {0}")]
    Unavailable(String),
}

/// Default embedding dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMS: usize = 1536;

/// OpenAI embeddings API client.
pub struct OpenAiEmbedder {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    dims: usize,
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("dims", &self.dims)
            .finish_non_exhaustive()
    }
}

impl OpenAiEmbedder {
    /// Create an embedder for the given model.
    pub fn new(model: &str, api_key: &str, base_url: &str) -> Self {
        Self {
            model: model.to_owned(),
            api_key: api_key.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            client: reqwest::Client::new(),
            dims: DEFAULT_DIMS,
        }
    }

    fn build_request(&self, text: &str) -> EmbedRequest {
        EmbedRequest {
            model: self.model.clone(),
            input: text.to_owned(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = self.build_request(text);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(EmbedderError::Unavailable(format!(
                "embeddings endpoint returned {status}: {body_text}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbedderError::Parse(e.to_string()))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbedderError::Parse("empty embeddings array".to_owned()))?;

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Request body for `/v1/embeddings`.
#[derive(Debug, Serialize)]
struct EmbedRequest {
    /// Model name.
    model: String,
    /// Input text to embed.
    input: String,
}

/// Response body from `/v1/embeddings`.
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    /// One entry per input.
    data: Vec<EmbedData>,
}

/// A single embedding entry.
#[derive(Debug, Deserialize)]
struct EmbedData {
    /// The embedding vector.
    embedding: Vec<f32>,
}
