//! Hosted embedding provider speaking the OpenAI `/embeddings` protocol.
//!
//! Works with any service exposing the same request/response shape
//! (set `base_url` to point elsewhere).

use async_trait::async_trait;
use quiver_core::{Error, Result};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::embedding::EmbeddingProvider;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Embedding provider backed by an OpenAI-compatible HTTP API.
pub struct OpenAiEmbeddingProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingProvider {
    /// Creates a new provider.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Bearer token for the API
    /// * `model` - Model ID (e.g., "text-embedding-3-small")
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the provider at a different OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::embedding(format!("Failed to call embeddings API: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_status(status, &error_text));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("Failed to parse embeddings response: {e}")))?;

        order_embeddings(parsed.data, texts.len())
    }
}

/// Rate limits and server errors are transient; anything else is a caller problem.
fn classify_status(status: StatusCode, body: &str) -> Error {
    let message = format!("Embeddings API error {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Error::embedding(message)
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Error::config(message)
    } else {
        Error::invalid_data(message)
    }
}

/// Put embeddings back in request order and check none are missing.
fn order_embeddings(mut data: Vec<EmbeddingDatum>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(Error::embedding(format!(
            "Embeddings API returned {} vectors for {expected} inputs",
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::embedding("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }

    fn name(&self) -> &str {
        &self.model
    }
}
