//! OpenAI-compatible embedding client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ragbot_core::{
    resolve_api_base, resolve_api_key, Embedder, EmbeddingConfig, RagError, Result,
};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [&'a str],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    /// Create from configuration, resolving the `"default"` base URL and
    /// falling back to `OPENAI_API_KEY`.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(
            resolve_api_base(&config.api_base),
            resolve_api_key(config.api_key.as_deref()),
            config.model.clone(),
        )
    }

    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            input: texts,
            model: &self.model,
        };

        let response = self
            .apply_auth(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::embedding(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::embedding(format!(
                "{} returned {}: {}",
                url, status, body
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::protocol(format!("malformed embeddings response: {}", e)))?;

        if parsed.data.len() != texts.len() {
            return Err(RagError::protocol(format!(
                "requested {} embeddings, received {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index);
        debug!("Embedded {} texts with {}", texts.len(), self.model);

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
