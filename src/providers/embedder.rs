//! Embedding backend for the job queue's `generate_embedding` worker.
//!
//! Calls an OpenAI-compatible `/v1/embeddings` endpoint, the same shape
//! used by OpenAI itself, Ollama, and most self-hosted embedding servers.
//! Grounded in the pack's embedding-client pattern (batch call, bearer
//! auth, `{"data": [{"embedding": [...]}]}` response envelope).

use crate::config::EmbedderConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use pgvector::Vector;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::instrument;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a batch of texts in one call. The returned vector has the
    /// same length and order as `texts`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>>;

    fn model(&self) -> &str;

    fn dimension(&self) -> usize;

    fn batch_size(&self) -> usize;
}

pub struct OpenAiCompatibleEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: secrecy::SecretString,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl OpenAiCompatibleEmbedder {
    pub fn new(config: &EmbedderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiCompatibleEmbedder {
    #[instrument(skip(self, texts), fields(n = texts.len(), model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&serde_json::json!({
                "model": self.model,
                "input": texts,
            }))
            .send()
            .await
            .map_err(|e| Error::TransientBackend(format!("embedding request failed: {e}")))?;

        if response.status().is_server_error() {
            return Err(Error::TransientBackend(format!(
                "embedding backend returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(Error::PermanentBackend(format!(
                "embedding backend returned {}",
                response.status()
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| Error::TransientBackend(format!("malformed embedding response: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(Error::PermanentBackend(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        Ok(parsed
            .data
            .into_iter()
            .map(|entry| Vector::from(entry.embedding))
            .collect())
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}
