//! Retrieval modules: one independently scored ranking each.

use async_trait::async_trait;
use quiver_core::{PayloadFilter, Result, ScoredHit};
use quiver_fts::LexicalIndex;
use quiver_vector::{EmbeddingProvider, VectorIndexBackend};
use std::sync::Arc;

/// A source of ranked hits for a text query.
#[async_trait]
pub trait RetrievalModule: Send + Sync {
    /// Module name, used in degradation reports.
    fn name(&self) -> &str;

    /// Best `top_k` hits for `query`, best first.
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredHit>>;
}

/// Dense similarity search: embed the query, then search a collection.
pub struct DenseModule {
    name: String,
    backend: Arc<dyn VectorIndexBackend>,
    provider: Arc<dyn EmbeddingProvider>,
    collection: String,
}

impl DenseModule {
    /// Bind a collection on `backend`, embedding queries with `provider`.
    pub fn new(
        name: impl Into<String>,
        backend: Arc<dyn VectorIndexBackend>,
        provider: Arc<dyn EmbeddingProvider>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            backend,
            provider,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl RetrievalModule for DenseModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredHit>> {
        let vector = self.provider.embed(query).await?;
        let mut results = self
            .backend
            .query(&self.collection, &[vector], top_k, filter)
            .await?;
        Ok(results.pop().unwrap_or_default())
    }
}

/// Keyword search over a lexical index.
pub struct LexicalModule {
    name: String,
    index: Arc<dyn LexicalIndex>,
}

impl LexicalModule {
    /// Wrap `index`.
    pub fn new(name: impl Into<String>, index: Arc<dyn LexicalIndex>) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

#[async_trait]
impl RetrievalModule for LexicalModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredHit>> {
        self.index.search(query, top_k, filter).await
    }
}
