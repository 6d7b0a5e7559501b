//! The storage-engine interface and its factory.
//!
//! Every adapter (in-process, self-hosted server, managed cloud) implements
//! [`VectorIndexBackend`]; callers hold an `Arc<dyn VectorIndexBackend>` and
//! never see which engine is behind it.

use async_trait::async_trait;
use quiver_core::{Payload, PayloadFilter, Result, ScoredHit};
use std::collections::HashSet;
use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::memory::MemoryBackend;
use crate::qdrant::QdrantBackend;
use crate::types::{BackendConfig, CollectionInfo, CollectionSpec, EngineConfig, VectorRecord};

/// Uniform interface over vector storage engines.
///
/// All writes are upserts keyed by id. Implementations must be safe to call
/// concurrently and must never hold a lock across an await point.
#[async_trait]
pub trait VectorIndexBackend: Send + Sync {
    /// Engine name for logs ("memory", "qdrant", ...).
    fn name(&self) -> &str;

    /// Create the collection if needed and fix its dimension.
    ///
    /// The dimension comes from `spec.dimension` or, when absent, from a
    /// single probe embedding through `provider`. Concurrent callers share
    /// one probe; a failed probe leaves the collection dimensionless.
    async fn ensure_collection(
        &self,
        spec: &CollectionSpec,
        provider: &dyn EmbeddingProvider,
    ) -> Result<usize>;

    /// Describe a collection, or `None` when it does not exist.
    async fn collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>>;

    /// Upsert records. Returns the number committed.
    ///
    /// The whole call is rejected, without mutating anything, if any vector
    /// length differs from the collection dimension.
    async fn add(
        &self,
        collection: &str,
        ids: &[String],
        vectors: &[Vec<f32>],
        payloads: Option<&[Payload]>,
    ) -> Result<usize>;

    /// Nearest neighbours for each query vector, best first.
    ///
    /// Unknown or empty collections yield one empty list per query.
    async fn query(
        &self,
        collection: &str,
        queries: &[Vec<f32>],
        top_k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<Vec<ScoredHit>>>;

    /// Stored records for `ids`; missing ids are omitted. An absent
    /// collection is reported as `CollectionNotFound`.
    async fn fetch(&self, collection: &str, ids: &[String]) -> Result<Vec<VectorRecord>>;

    /// The subset of `ids` present in the collection.
    async fn exists(&self, collection: &str, ids: &[String]) -> Result<HashSet<String>>;

    /// Remove records by id. Absent ids are ignored; an absent collection
    /// is reported as `CollectionNotFound`.
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()>;

    /// Drop a collection and all its records. Absent collections are ignored.
    async fn delete_collection(&self, collection: &str) -> Result<()>;

    /// Make committed writes durable. Engines that write through do nothing.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Check the parallel slices handed to [`VectorIndexBackend::add`].
pub(crate) fn check_add_shape(
    ids: &[String],
    vectors: &[Vec<f32>],
    payloads: Option<&[Payload]>,
) -> Result<()> {
    if ids.len() != vectors.len() {
        return Err(quiver_core::Error::invalid_data(format!(
            "{} ids but {} vectors",
            ids.len(),
            vectors.len()
        )));
    }
    if let Some(payloads) = payloads
        && payloads.len() != ids.len()
    {
        return Err(quiver_core::Error::invalid_data(format!(
            "{} ids but {} payloads",
            ids.len(),
            payloads.len()
        )));
    }
    Ok(())
}

/// Build the adapter selected by `config.engine`.
pub fn create_backend(config: &BackendConfig) -> Result<Arc<dyn VectorIndexBackend>> {
    let backend: Arc<dyn VectorIndexBackend> = match &config.engine {
        EngineConfig::Memory { path: None } => Arc::new(MemoryBackend::new()),
        EngineConfig::Memory { path: Some(path) } => Arc::new(MemoryBackend::open(path)?),
        EngineConfig::Qdrant { url } => Arc::new(QdrantBackend::new(url.clone())?),
        EngineConfig::QdrantCloud { url, api_key } => {
            Arc::new(QdrantBackend::new(url.clone())?.with_api_key(api_key.clone()))
        }
    };
    log::debug!(
        "Created {} backend '{}' for collection '{}'",
        backend.name(),
        config.name,
        config.collection
    );
    Ok(backend)
}
