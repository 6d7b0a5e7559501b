//! Per-collection state shared by every backend adapter.
//!
//! A collection's dimension is stored in a [`tokio::sync::OnceCell`]: it is
//! set at most once, and concurrent first writers all observe the same
//! winner. A failed probe leaves the cell empty so the next caller retries.

use quiver_core::{Error, Result, SimilarityMetric};
use tokio::sync::OnceCell;

use crate::embedding::EmbeddingProvider;

/// Text embedded once to learn a provider's output length.
pub const DIMENSION_PROBE: &str = "dimension probe";

/// Name, metric and (lazily fixed) dimension of a collection.
#[derive(Debug)]
pub struct CollectionState {
    name: String,
    metric: SimilarityMetric,
    dimension: OnceCell<usize>,
}

impl CollectionState {
    /// A collection whose dimension is not yet known.
    pub fn new(name: impl Into<String>, metric: SimilarityMetric) -> Self {
        Self {
            name: name.into(),
            metric,
            dimension: OnceCell::new(),
        }
    }

    /// A collection whose dimension is already fixed (e.g. reloaded from disk).
    pub fn with_dimension(
        name: impl Into<String>,
        metric: SimilarityMetric,
        dimension: Option<usize>,
    ) -> Self {
        Self {
            name: name.into(),
            metric,
            dimension: OnceCell::new_with(dimension),
        }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Similarity metric.
    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    /// Fixed dimension, once known.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    /// Fix the dimension from `explicit`, or by probing `provider` once.
    ///
    /// When the dimension is already set, an explicit value that disagrees is
    /// ignored with a warning; the stored dimension never changes.
    pub async fn resolve(
        &self,
        explicit: Option<usize>,
        provider: &dyn EmbeddingProvider,
    ) -> Result<usize> {
        let dimension = self
            .init_with(|| self.pick_dimension(explicit, provider))
            .await?;
        self.warn_on_conflict(explicit, dimension);
        Ok(dimension)
    }

    /// Fix the dimension with `init` unless it is already set.
    ///
    /// Adapters whose engine already knows the dimension (a remote collection
    /// created by an earlier process) use this to adopt it.
    pub async fn init_with<F, Fut>(&self, init: F) -> Result<usize>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<usize>>,
    {
        self.dimension.get_or_try_init(init).await.copied()
    }

    /// `explicit` when given, otherwise one probe through `provider`.
    pub async fn pick_dimension(
        &self,
        explicit: Option<usize>,
        provider: &dyn EmbeddingProvider,
    ) -> Result<usize> {
        let dimension = match explicit {
            Some(0) => {
                return Err(Error::config(format!(
                    "collection '{}' dimension must be greater than 0",
                    self.name
                )));
            }
            Some(dimension) => dimension,
            None => probe_dimension(provider).await?,
        };
        log::info!(
            "Collection '{}' dimension fixed at {dimension} ({})",
            self.name,
            if explicit.is_some() { "explicit" } else { "probed" }
        );
        Ok(dimension)
    }

    /// Log when a caller asks for a dimension other than the stored one.
    pub fn warn_on_conflict(&self, explicit: Option<usize>, dimension: usize) {
        if let Some(requested) = explicit
            && requested != dimension
        {
            log::warn!(
                "Collection '{}' already has dimension {dimension}; ignoring requested {requested}",
                self.name
            );
        }
    }

    /// Check a batch of vectors, adopting the first vector's length as the
    /// dimension if none is set yet. Returns the collection dimension.
    ///
    /// The batch must be internally consistent before anything is adopted,
    /// so a rejected batch never fixes the dimension.
    pub async fn admit(&self, vectors: &[Vec<f32>]) -> Result<Option<usize>> {
        let Some(first) = vectors.first() else {
            return Ok(self.dimension());
        };
        if first.is_empty() {
            return Err(Error::invalid_data(format!(
                "collection '{}' rejects empty vectors",
                self.name
            )));
        }

        let candidate = self.dimension().unwrap_or(first.len());
        self.check(candidate, vectors)?;

        let dimension = *self.dimension.get_or_init(|| async { candidate }).await;
        if dimension != candidate {
            // Lost the adoption race to a writer with a different length.
            self.check(dimension, vectors)?;
        }
        Ok(Some(dimension))
    }

    /// Reject any vector whose length differs from `expected`.
    pub fn check(&self, expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
        match vectors.iter().find(|v| v.len() != expected) {
            Some(bad) => Err(Error::dimension_mismatch(&self.name, expected, bad.len())),
            None => Ok(()),
        }
    }
}

/// Embed [`DIMENSION_PROBE`] once and report the vector length.
pub async fn probe_dimension(provider: &dyn EmbeddingProvider) -> Result<usize> {
    log::debug!("Probing embedding dimension via '{}'", provider.name());
    let probe = provider.embed(DIMENSION_PROBE).await?;
    if probe.is_empty() {
        return Err(Error::embedding(format!(
            "provider '{}' returned an empty probe embedding",
            provider.name()
        )));
    }
    Ok(probe.len())
}

// ============================================================================
// Tests
// ============================================================================
