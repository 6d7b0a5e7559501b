//! Retrieval for Quiver: dense, lexical and fused.
//!
//! Each [`RetrievalModule`] produces its own ranking on its own score scale.
//! [`HybridRetriever`] queries all configured modules concurrently, bounded
//! by a per-module timeout, and merges their rankings with weighted
//! Reciprocal Rank Fusion ([`weighted_rrf`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use quiver_retrieval::{HybridRetriever, ModuleConfig, ModuleKind, RetrievalOptions, RetrievalTargets};
//!
//! let mut targets = RetrievalTargets::new();
//! targets.add_dense("vectors", backend, provider, "docs").add_lexical("keywords", index);
//!
//! let modules = [
//!     ModuleConfig::new("dense", ModuleKind::Dense, "vectors"),
//!     ModuleConfig::new("bm25", ModuleKind::Lexical, "keywords").with_weight(4.0),
//! ];
//! let retriever = HybridRetriever::from_config(&modules, RetrievalOptions::default(), &targets)?;
//! let outcome = retriever.retrieve("ownership rules", 10, None).await?;
//! ```

pub mod fusion;
pub mod module;
pub mod retriever;

pub use fusion::{DEFAULT_RRF_K, RankedList, weighted_rrf};
pub use module::{DenseModule, LexicalModule, RetrievalModule};
pub use retriever::{
    DegradedModule, HybridRetriever, ModuleConfig, ModuleKind, RetrievalOptions,
    RetrievalOutcome, RetrievalTargets,
};
