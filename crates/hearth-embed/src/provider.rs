//! Embedding provider trait and the remote OpenAI-compatible embedder.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use hearth_core::{Error, Result};

/// Maps text to a fixed-length numeric vector.
///
/// Every call is an I/O boundary; failures surface as
/// `Error::Provider` and must be absorbed by the retrieval layer
/// rather than crashing a request.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text. Errors on empty input, provider
    /// unavailability, or an empty response.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Output dimension `D`; must match the chunk store's dimension.
    fn dimension(&self) -> usize;
}

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

/// Remote embedder for OpenAI-compatible `/v1/embeddings` endpoints.
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(
            "https://api.openai.com/v1",
            api_key,
            DEFAULT_EMBEDDING_MODEL,
            DEFAULT_EMBEDDING_DIM,
        )
    }

    pub fn with_endpoint(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
        }
    }

    /// Build from the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY is not set".into()))?;
        Ok(Self::new(api_key))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::Provider("cannot embed empty text".into()));
        }

        let url = format!("{}/embeddings", self.base_url);
        debug!("Embedding {} chars via {}", text.len(), self.model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({"model": self.model, "input": text}))
            .send()
            .await
            .map_err(|e| Error::Provider(format!("embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "embedding API error {}: {}",
                status, body
            )));
        }

        let parsed: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("malformed embedding response: {}", e)))?;

        let embedding: Vec<f32> = parsed["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| Error::Provider("no embedding returned".into()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        if embedding.len() != self.dimension {
            return Err(Error::Provider(format!(
                "provider returned dimension {}, expected {}",
                embedding.len(),
                self.dimension
            )));
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
