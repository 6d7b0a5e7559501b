//! Lexical index interface and configuration.

use async_trait::async_trait;
use quiver_core::{Payload, PayloadFilter, Result, ScoredHit};
use serde::{Deserialize, Serialize};

/// Definition of one lexical index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalConfig {
    /// Unique index name, referenced by retrieval modules.
    pub name: String,

    /// Index directory; the index lives in RAM only when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl LexicalConfig {
    /// Create an in-memory index definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
        }
    }
}

/// A document handed to a lexical index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalDocument {
    /// Unique document identifier (shared with the vector side).
    pub id: String,

    /// Text to index.
    pub text: String,

    /// Metadata returned with hits and matched by filters.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: Payload,
}

impl LexicalDocument {
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

/// Keyword search over a document collection.
///
/// Scores are relevance values on the index's own scale and are not
/// comparable with dense similarity scores.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Index name for logs.
    fn name(&self) -> &str;

    /// Best `top_k` documents for `query`, best first, ties by ascending id.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredHit>>;

    /// Insert or replace documents by id. Returns the number indexed.
    async fn upsert(&self, documents: Vec<LexicalDocument>) -> Result<usize>;

    /// Remove documents by id. Absent ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Number of indexed documents.
    fn len(&self) -> usize;

    /// Whether the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make indexed documents durable. Indexes that commit on every write
    /// do nothing.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
