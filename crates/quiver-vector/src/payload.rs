//! Payload construction for ingested documents.
//!
//! Persisted shape: `{text, text_length, indexed_at, embedding_model,
//! collection_name, ...custom}`. Other tooling reads these keys, so the
//! reserved ones always carry the pipeline's values even when a caller's
//! metadata uses the same names.

use chrono::{SecondsFormat, Utc};
use quiver_core::Payload;
use serde_json::Value;

/// Original document text (only when text storage is enabled).
pub const TEXT_KEY: &str = "text";
/// Character count of the original text.
pub const TEXT_LENGTH_KEY: &str = "text_length";
/// RFC 3339 UTC timestamp of the write.
pub const INDEXED_AT_KEY: &str = "indexed_at";
/// Embedding model identifier.
pub const EMBEDDING_MODEL_KEY: &str = "embedding_model";
/// Collection the record was written to.
pub const COLLECTION_NAME_KEY: &str = "collection_name";

/// Build the payload for one document.
pub fn build_payload(
    text: &str,
    metadata: &Payload,
    store_text: bool,
    embedding_model: &str,
    collection: &str,
) -> Payload {
    let mut payload = metadata.clone();
    if store_text {
        payload.insert(TEXT_KEY.to_string(), Value::from(text));
    } else {
        payload.remove(TEXT_KEY);
    }
    payload.insert(
        TEXT_LENGTH_KEY.to_string(),
        Value::from(text.chars().count()),
    );
    payload.insert(
        INDEXED_AT_KEY.to_string(),
        Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    payload.insert(EMBEDDING_MODEL_KEY.to_string(), Value::from(embedding_model));
    payload.insert(COLLECTION_NAME_KEY.to_string(), Value::from(collection));
    payload
}
