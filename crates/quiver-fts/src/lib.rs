//! Lexical search for Quiver.
//!
//! This crate provides a BM25 Okapi keyword index behind the
//! [`LexicalIndex`] trait, used as the sparse half of hybrid retrieval.
//!
//! - [`tokenizer`]: Tantivy analyzer chain (lowercasing, English stop words, stemming)
//! - [`bm25`]: [`Bm25Index`] on Tantivy, in RAM or in an index directory
//! - [`backend`]: [`LexicalIndex`] trait, [`LexicalConfig`], [`LexicalDocument`]

pub mod backend;
pub mod bm25;
pub mod tokenizer;

pub use backend::{LexicalConfig, LexicalDocument, LexicalIndex};
pub use bm25::Bm25Index;
pub use tokenizer::tokenize;
