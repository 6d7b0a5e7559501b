//! Vector storage, embedding and ingestion for Quiver.
//!
//! This crate provides the storage-engine interface with its adapters, the
//! embedding provider abstraction, per-collection dimension management and
//! the batched ingestion pipeline.
//!
//! # Features
//!
//! - `embed-fastembed`: Enable local embedding generation via fastembed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     quiver-vector                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider trait                                    │
//! │  ├── MockEmbeddingProvider (always available)               │
//! │  ├── OpenAiEmbeddingProvider (hosted, HTTP)                 │
//! │  └── FastEmbedProvider (feature: embed-fastembed)           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  VectorIndexBackend trait                                   │
//! │  ├── MemoryBackend (embedded, JSON snapshot)                │
//! │  └── QdrantBackend (self-hosted or cloud, REST)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CollectionState (dimension fixed once, probe on demand)    │
//! │  IngestionPipeline (batch + parallel + retry + deadline)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use quiver_vector::{
//!     CollectionSpec, IngestDocument, IngestionPipeline, MemoryBackend,
//!     MockEmbeddingProvider,
//! };
//! use std::sync::Arc;
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let provider = Arc::new(MockEmbeddingProvider::new(384));
//! let pipeline = IngestionPipeline::new(backend, provider, CollectionSpec::new("docs"));
//!
//! let report = pipeline
//!     .ingest(vec![IngestDocument::new("doc-1", "Reciprocal rank fusion")])
//!     .await?;
//! assert!(report.is_complete());
//! ```

// Core modules (always available)
pub mod backend;
pub mod collection;
pub mod distance;
pub mod embedding;
pub mod types;

// Adapters
pub mod memory;
pub mod openai;
pub mod qdrant;

// Ingestion
pub mod ingest;
pub mod payload;

// Feature-gated providers
#[cfg(feature = "embed-fastembed")]
pub mod fastembed;

// Re-exports: core types
pub use types::{
    BackendConfig, CollectionInfo, CollectionSpec, EmbeddingConfig, EngineConfig, FailedRecord,
    IngestDocument, IngestOptions, IngestReport, VectorRecord,
};

// Re-exports: traits, adapters and factories
pub use backend::{VectorIndexBackend, create_backend};
pub use collection::{CollectionState, probe_dimension};
pub use embedding::{EmbeddingProvider, MockEmbeddingProvider, create_embedding_provider};
pub use memory::MemoryBackend;
pub use openai::OpenAiEmbeddingProvider;
pub use qdrant::QdrantBackend;

// Re-exports: ingestion
pub use ingest::IngestionPipeline;
pub use payload::build_payload;

#[cfg(feature = "embed-fastembed")]
pub use crate::fastembed::FastEmbedProvider;
