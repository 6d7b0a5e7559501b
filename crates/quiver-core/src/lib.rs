//! Quiver Core: shared types, errors, and the retrieval data model.
//!
//! This crate provides the foundational types used across all Quiver crates.
//! It has no internal Quiver dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error taxonomy and Result alias
//! - [`records`]: JSON array / JSON Lines record files
//! - [`types`]: Payloads, scored hits, similarity metrics, and payload filters

pub mod error;
pub mod records;
pub mod types;

// Re-export key types at crate root for convenience
pub use error::{Error, Result};
pub use records::parse_json_records;
pub use types::{Payload, PayloadFilter, ScoredHit, SimilarityMetric, sort_hits};
