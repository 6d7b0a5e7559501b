//! Embedding provider trait and mock implementation.
//!
//! This module defines the `EmbeddingProvider` trait that abstracts over
//! different embedding generation backends (hosted HTTP APIs, fastembed, etc.).
//! Providers do not advertise their output dimension; collections learn it
//! by probing (see [`crate::collection`]).
//!
//! # Providers
//!
//! - `MockEmbeddingProvider`: Deterministic fixed-dimension vectors for testing
//! - `OpenAiEmbeddingProvider`: Hosted embeddings over HTTP
//! - `FastEmbedProvider`: Local embedding via fastembed (requires `embed-fastembed` feature)

use async_trait::async_trait;
use quiver_core::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::openai::OpenAiEmbeddingProvider;
use crate::types::EmbeddingConfig;

/// Trait for generating text embeddings.
///
/// Implementations wrap specific embedding libraries or services and provide
/// a uniform async interface. The trait requires `Send + Sync` to allow safe
/// sharing across ingestion workers.
///
/// Failures should be reported as [`Error::EmbeddingProvider`] so the
/// ingestion pipeline treats them as transient.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for a batch of texts.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    /// Backends that support native batching should override this.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// The model identifier recorded in payloads as `embedding_model`.
    fn name(&self) -> &str;
}

/// Build the provider described by `config`.
pub fn create_embedding_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "mock" => {
            let dimension = config.dimension.unwrap_or(DEFAULT_MOCK_DIMENSION);
            if dimension == 0 {
                return Err(Error::config("mock embedding dimension must be greater than 0"));
            }
            Ok(Arc::new(
                MockEmbeddingProvider::new(dimension).with_name(config.model.clone()),
            ))
        }
        "openai" => {
            let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                Error::config(format!(
                    "environment variable {} is not set (required by the openai provider)",
                    config.api_key_env
                ))
            })?;
            let mut provider = OpenAiEmbeddingProvider::new(api_key, config.model.clone());
            if let Some(ref url) = config.base_url {
                provider = provider.with_base_url(url.clone());
            }
            Ok(Arc::new(provider))
        }
        #[cfg(feature = "embed-fastembed")]
        "fastembed" => Ok(Arc::new(crate::fastembed::FastEmbedProvider::new(
            &config.model,
            config.cache_path.as_deref(),
        )?)),
        other => Err(Error::config(format!(
            "Unknown embedding provider: '{other}'. Supported: mock, openai{}",
            if cfg!(feature = "embed-fastembed") {
                ", fastembed"
            } else {
                ""
            }
        ))),
    }
}

const DEFAULT_MOCK_DIMENSION: usize = 384;

/// A mock embedding provider for testing.
///
/// Generates deterministic vectors based on the input text bytes.
/// Each component is derived from the text bytes, producing consistent
/// embeddings for the same input. Counts calls so tests can assert how often
/// the provider was consulted.
pub struct MockEmbeddingProvider {
    dimension: usize,
    name: String,
    calls: AtomicUsize,
}

impl MockEmbeddingProvider {
    /// Create a new mock provider with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            name: "mock".to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Override the reported model name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of `embed`/`embed_batch` calls served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Generate a deterministic embedding from text.
    fn deterministic_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];
        let bytes = text.as_bytes();

        for (i, val) in embedding.iter_mut().enumerate() {
            let byte_idx = i % bytes.len().max(1);
            let byte_val = if bytes.is_empty() {
                0u8
            } else {
                bytes[byte_idx]
            };
            *val = ((byte_val as f32 + i as f32) % 256.0) / 256.0;
        }

        // Normalize to unit vector
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut embedding {
                *val /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.deterministic_embedding(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| self.deterministic_embedding(t))
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_provider_creation() {
        let provider = MockEmbeddingProvider::new(384);
        assert_eq!(provider.name(), "mock");
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_embed_single() {
        let provider = MockEmbeddingProvider::new(8);
        let embedding = provider.embed("hello world").await.unwrap();

        assert_eq!(embedding.len(), 8);

        // Verify unit-normalized
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_embed_deterministic() {
        let provider = MockEmbeddingProvider::new(16);
        let e1 = provider.embed("same text").await.unwrap();
        let e2 = provider.embed("same text").await.unwrap();

        assert_eq!(e1, e2);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_embed_different_texts() {
        let provider = MockEmbeddingProvider::new(16);
        let e1 = provider.embed("text one").await.unwrap();
        let e2 = provider.embed("text two").await.unwrap();

        assert_ne!(e1, e2);
    }

    #[tokio::test]
    async fn test_mock_embed_batch() {
        let provider = MockEmbeddingProvider::new(8);
        let texts = vec!["hello", "world", "test"];
        let embeddings = provider.embed_batch(&texts).await.unwrap();

        assert_eq!(embeddings.len(), 3);
        for emb in &embeddings {
            assert_eq!(emb.len(), 8);
        }
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_embed_batch_empty() {
        let provider = MockEmbeddingProvider::new(4);
        let texts: Vec<&str> = vec![];
        let embeddings = provider.embed_batch(&texts).await.unwrap();

        assert!(embeddings.is_empty());
    }

    #[test]
    fn test_create_mock_provider() {
        let config = EmbeddingConfig {
            dimension: Some(12),
            model: "mock-small".into(),
            ..Default::default()
        };
        let provider = create_embedding_provider(&config).unwrap();
        assert_eq!(provider.name(), "mock-small");
    }

    #[test]
    fn test_create_mock_provider_zero_dimension() {
        let config = EmbeddingConfig {
            dimension: Some(0),
            ..Default::default()
        };
        assert!(create_embedding_provider(&config).is_err());
    }

    #[test]
    fn test_create_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "word2vec".into(),
            ..Default::default()
        };
        let err = create_embedding_provider(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_create_openai_requires_key() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            model: "text-embedding-3-small".into(),
            api_key_env: "QUIVER_TEST_UNSET_EMBEDDING_KEY".into(),
            ..Default::default()
        };
        let err = create_embedding_provider(&config).err().unwrap();
        assert!(err.to_string().contains("QUIVER_TEST_UNSET_EMBEDDING_KEY"));
    }

    #[test]
    fn test_trait_object_safety() {
        // Verify EmbeddingProvider can be used as a trait object
        fn _assert_object_safe(_: &dyn EmbeddingProvider) {}
    }
}
