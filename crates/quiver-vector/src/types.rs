//! Common types for the vector module.
//!
//! These types are used across all vector backends, embedding providers and
//! the ingestion pipeline, and are always available regardless of feature flags.

use quiver_core::{Error, Payload, Result, SimilarityMetric};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Configuration
// ============================================================================

/// Definition of one vector backend: engine, collection, embedding model
/// and ingestion tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Unique backend name, referenced by retrieval modules.
    pub name: String,

    /// Storage engine and its connection parameters.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Collection the backend reads and writes.
    pub collection: String,

    /// Similarity metric for the collection.
    #[serde(default)]
    pub metric: SimilarityMetric,

    /// Explicit embedding dimension (auto-detected when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,

    /// Whether the original text is stored in the payload.
    #[serde(default = "default_true")]
    pub store_text: bool,

    /// Embedding model used for documents and queries.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Batch, parallelism and retry tuning.
    #[serde(default)]
    pub ingest: IngestOptions,
}

impl BackendConfig {
    /// Create a backend definition with defaults for everything but the names.
    pub fn new(name: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            engine: EngineConfig::default(),
            collection: collection.into(),
            metric: SimilarityMetric::default(),
            dimension: None,
            store_text: true,
            embedding: EmbeddingConfig::default(),
            ingest: IngestOptions::default(),
        }
    }

    /// The collection spec this backend writes to.
    pub fn collection_spec(&self) -> CollectionSpec {
        CollectionSpec {
            name: self.collection.clone(),
            metric: self.metric,
            dimension: self.dimension,
        }
    }
}

/// Storage engine selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineConfig {
    /// In-process store, optionally persisted to a JSON snapshot.
    Memory {
        /// Snapshot file path.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },

    /// Self-hosted Qdrant server.
    Qdrant {
        /// Base URL, e.g. `http://localhost:6333`.
        #[serde(default = "default_qdrant_url")]
        url: String,
    },

    /// Managed Qdrant Cloud cluster.
    QdrantCloud {
        /// Cluster URL.
        url: String,
        /// API key sent with every request.
        api_key: String,
    },
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::Memory { path: None }
    }
}

/// Embedding provider selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider: "mock", "openai" or "fastembed".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name (e.g., "text-embedding-3-small").
    #[serde(default = "default_model")]
    pub model: String,

    /// Output dimension for the mock provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,

    /// Environment variable holding the API key (hosted providers).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Override for the hosted provider's base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model cache directory (local providers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dimension: None,
            api_key_env: default_api_key_env(),
            base_url: None,
            cache_path: None,
        }
    }
}

/// Ingestion tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Records per batch.
    pub batch_size: usize,

    /// Batches processed concurrently.
    pub parallelism: usize,

    /// Retries per batch after the first attempt.
    pub max_retries: usize,

    /// First backoff delay, in milliseconds.
    pub initial_backoff_ms: u64,

    /// Backoff ceiling, in milliseconds.
    pub max_backoff_ms: u64,

    /// Overall deadline for one ingestion call, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: 64,
            parallelism: 1,
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
            deadline_ms: None,
        }
    }
}

impl IngestOptions {
    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the worker count.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff window.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff_ms = initial.as_millis() as u64;
        self.max_backoff_ms = max.as_millis() as u64;
        self
    }

    /// Set the overall deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(deadline.as_millis() as u64);
        self
    }

    /// Reject tunings that cannot make progress.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be greater than 0"));
        }
        if self.parallelism == 0 {
            return Err(Error::config("parallelism must be greater than 0"));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(Error::config(
                "initial_backoff_ms must not exceed max_backoff_ms",
            ));
        }
        Ok(())
    }

    /// First backoff delay.
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Backoff ceiling.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Overall deadline, if any.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

fn default_true() -> bool {
    true
}

fn default_provider() -> String {
    "mock".to_string()
}

fn default_model() -> String {
    "mock".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}

// ============================================================================
// Collections and records
// ============================================================================

/// What a caller asks for when creating (or re-opening) a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    /// Collection name.
    pub name: String,

    /// Similarity metric.
    #[serde(default)]
    pub metric: SimilarityMetric,

    /// Explicit dimension; probed from the embedding provider when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
}

impl CollectionSpec {
    /// Create a spec with the default metric and no explicit dimension.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metric: SimilarityMetric::default(),
            dimension: None,
        }
    }

    /// Set the metric.
    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Set an explicit dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }
}

/// Observed state of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,

    /// Similarity metric.
    pub metric: SimilarityMetric,

    /// Fixed dimension, once known.
    pub dimension: Option<usize>,

    /// Number of stored records.
    pub record_count: usize,
}

/// A stored vector with its identity and payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Caller-supplied identifier, unique within the collection.
    pub id: String,

    /// The embedding vector.
    pub vector: Vec<f32>,

    /// Metadata stored alongside the vector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl VectorRecord {
    /// Create a record.
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            payload: None,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// The vector dimension.
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

// ============================================================================
// Ingestion
// ============================================================================

/// A document handed to the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestDocument {
    /// Unique document identifier.
    pub id: String,

    /// Text to embed.
    pub text: String,

    /// Caller-supplied metadata, merged into the payload.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: Payload,
}

impl IngestDocument {
    /// Create a document without metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Payload::new(),
        }
    }

    /// Add a metadata key-value pair.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A record the pipeline could not commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRecord {
    /// Document identifier.
    pub id: String,
    /// Last error observed for the record's batch.
    pub error: String,
}

/// Outcome of one ingestion call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Identifiers committed to the backend, in input order.
    pub succeeded: Vec<String>,

    /// Identifiers that could not be committed, in input order.
    pub failed: Vec<FailedRecord>,
}

impl IngestReport {
    /// Whether every record was committed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total records accounted for.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Mark every id in `ids` as failed with `error`.
    pub(crate) fn fail_all<'a>(
        &mut self,
        ids: impl IntoIterator<Item = &'a str>,
        error: &str,
    ) {
        self.failed.extend(ids.into_iter().map(|id| FailedRecord {
            id: id.to_string(),
            error: error.to_string(),
        }));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------------
    // BackendConfig tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_backend_config_defaults() {
        let config: BackendConfig =
            serde_json::from_str(r#"{"name": "kb", "collection": "docs"}"#).unwrap();
        assert_eq!(config.name, "kb");
        assert_eq!(config.engine, EngineConfig::Memory { path: None });
        assert_eq!(config.metric, SimilarityMetric::Cosine);
        assert!(config.dimension.is_none());
        assert!(config.store_text);
        assert_eq!(config.embedding.provider, "mock");
        assert_eq!(config.ingest.batch_size, 64);
        assert_eq!(config.ingest.parallelism, 1);
        assert_eq!(config.ingest.max_retries, 3);
    }

    #[test]
    fn test_engine_config_tagged() {
        let engine: EngineConfig =
            serde_json::from_str(r#"{"type": "qdrant-cloud", "url": "https://x", "api_key": "k"}"#)
                .unwrap();
        assert_eq!(
            engine,
            EngineConfig::QdrantCloud {
                url: "https://x".into(),
                api_key: "k".into()
            }
        );

        let engine: EngineConfig = serde_json::from_str(r#"{"type": "qdrant"}"#).unwrap();
        assert_eq!(
            engine,
            EngineConfig::Qdrant {
                url: "http://localhost:6333".into()
            }
        );
    }

    #[test]
    fn test_collection_spec_from_backend() {
        let mut config = BackendConfig::new("kb", "docs");
        config.dimension = Some(384);
        config.metric = SimilarityMetric::InnerProduct;

        let spec = config.collection_spec();
        assert_eq!(spec.name, "docs");
        assert_eq!(spec.dimension, Some(384));
        assert_eq!(spec.metric, SimilarityMetric::InnerProduct);
    }

    // ------------------------------------------------------------------------
    // IngestOptions tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_ingest_options_validate() {
        assert!(IngestOptions::default().validate().is_ok());
        assert!(IngestOptions::default().with_batch_size(0).validate().is_err());
        assert!(IngestOptions::default().with_parallelism(0).validate().is_err());
        assert!(
            IngestOptions::default()
                .with_backoff(Duration::from_secs(2), Duration::from_secs(1))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_ingest_options_durations() {
        let options = IngestOptions::default()
            .with_backoff(Duration::from_millis(5), Duration::from_millis(50))
            .with_deadline(Duration::from_secs(30));
        assert_eq!(options.initial_backoff(), Duration::from_millis(5));
        assert_eq!(options.max_backoff(), Duration::from_millis(50));
        assert_eq!(options.deadline(), Some(Duration::from_secs(30)));
    }

    // ------------------------------------------------------------------------
    // Record and report tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_vector_record_serialization_skips_empty_payload() {
        let record = VectorRecord::new("doc-1", vec![0.1, 0.2]);
        assert_eq!(record.dimension(), 2);
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("payload"));
    }

    #[test]
    fn test_ingest_document_metadata() {
        let doc = IngestDocument::new("doc-1", "text")
            .with_metadata("lang", "en")
            .with_metadata("page", 3);
        assert_eq!(doc.metadata.len(), 2);
        assert_eq!(doc.metadata["page"], 3);
    }

    #[test]
    fn test_ingest_report_accounting() {
        let mut report = IngestReport::default();
        assert!(report.is_complete());

        report.succeeded.push("a".into());
        report.fail_all(["b", "c"], "backend unavailable");
        assert!(!report.is_complete());
        assert_eq!(report.total(), 3);
        assert_eq!(report.failed[1].id, "c");
        assert_eq!(report.failed[1].error, "backend unavailable");
    }
}
