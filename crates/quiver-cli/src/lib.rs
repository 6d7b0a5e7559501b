//! Command-line interface for Quiver.
//!
//! Wires configuration, vector backends, lexical indexes, the hybrid
//! retriever and the evaluation engine into the `quiver` binary.
//!
//! # Commands
//!
//! - `ingest`: embed and index documents into backends and lexical indexes
//! - `query`: fused retrieval over the configured modules
//! - `evaluate`: score retrieval quality against a labelled query set
//! - `collection info|delete`: inspect or drop a backend's collection
//! - `config path|init|show`: manage the configuration file

pub mod app;
pub mod cli;
pub mod config;
pub mod config_handlers;
pub mod handlers;

pub use app::QuiverApp;
pub use cli::CliArgs;
pub use config::QuiverConfig;
