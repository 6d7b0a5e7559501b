//! Common types for the retrieval data model.
//!
//! These types are shared by every backend, retrieval module and the
//! evaluation engine, and are always available regardless of feature flags.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Metadata stored alongside a vector.
///
/// Always a JSON object; well-known keys are `text`, `text_length`,
/// `indexed_at`, `embedding_model` and `collection_name`.
pub type Payload = serde_json::Map<String, Value>;

// ============================================================================
// Similarity metric
// ============================================================================

/// Similarity metric a collection is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimilarityMetric {
    /// Cosine similarity.
    #[default]
    Cosine,
    /// Euclidean (L2) distance, reported as `1 / (1 + distance)`.
    #[serde(alias = "l2")]
    Euclidean,
    /// Inner (dot) product.
    #[serde(alias = "ip", alias = "dot")]
    InnerProduct,
}

impl SimilarityMetric {
    /// Canonical configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::InnerProduct => "inner-product",
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimilarityMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            "inner-product" | "inner_product" | "ip" | "dot" => Ok(Self::InnerProduct),
            other => Err(Error::config(format!(
                "Unknown similarity metric: '{other}'. Supported: cosine, euclidean (l2), inner-product (ip)"
            ))),
        }
    }
}

// ============================================================================
// Scored hits
// ============================================================================

/// One entry of a ranked retrieval result.
///
/// The meaning of `score` depends on the producer: a similarity for dense
/// search, a BM25 relevance for lexical search, or a fused rank score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredHit {
    /// Record identifier.
    pub id: String,

    /// Producer-specific score (higher is better).
    pub score: f32,

    /// Payload snapshot, when the producer returns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl ScoredHit {
    /// Create a hit without payload.
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
            payload: None,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Sort hits descending by score, breaking ties by ascending id.
///
/// NaN scores sort last so a misbehaving producer cannot scramble the order.
pub fn sort_hits(hits: &mut [ScoredHit]) {
    hits.sort_by(|a, b| compare_scores(b.score, a.score).then_with(|| a.id.cmp(&b.id)));
}

fn compare_scores(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

// ============================================================================
// Payload filters
// ============================================================================

/// Equality filter over payload fields.
///
/// A record matches when every listed key is present in its payload with an
/// equal JSON value. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadFilter {
    /// Required key/value pairs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub must: BTreeMap<String, Value>,
}

impl PayloadFilter {
    /// Create an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to equal `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.must.insert(key.into(), value.into());
        self
    }

    /// Whether the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    /// Test a payload against the filter.
    pub fn matches(&self, payload: Option<&Payload>) -> bool {
        if self.must.is_empty() {
            return true;
        }
        let Some(payload) = payload else {
            return false;
        };
        self.must
            .iter()
            .all(|(key, expected)| payload.get(key) == Some(expected))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_metric_from_str_aliases() {
        assert_eq!("cosine".parse::<SimilarityMetric>().unwrap(), SimilarityMetric::Cosine);
        assert_eq!("l2".parse::<SimilarityMetric>().unwrap(), SimilarityMetric::Euclidean);
        assert_eq!("IP".parse::<SimilarityMetric>().unwrap(), SimilarityMetric::InnerProduct);
        assert!("manhattan".parse::<SimilarityMetric>().is_err());
    }

    #[test]
    fn test_metric_serde_aliases() {
        let m: SimilarityMetric = serde_json::from_str("\"ip\"").unwrap();
        assert_eq!(m, SimilarityMetric::InnerProduct);
        let m: SimilarityMetric = serde_json::from_str("\"euclidean\"").unwrap();
        assert_eq!(m, SimilarityMetric::Euclidean);
        assert_eq!(
            serde_json::to_string(&SimilarityMetric::InnerProduct).unwrap(),
            "\"inner-product\""
        );
    }

    #[test]
    fn test_sort_hits_ties_by_id() {
        let mut hits = vec![
            ScoredHit::new("c", 0.5),
            ScoredHit::new("b", 0.9),
            ScoredHit::new("a", 0.5),
        ];
        sort_hits(&mut hits);
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_sort_hits_nan_last() {
        let mut hits = vec![ScoredHit::new("nan", f32::NAN), ScoredHit::new("ok", 0.1)];
        sort_hits(&mut hits);
        assert_eq!(hits[0].id, "ok");
    }

    #[test]
    fn test_hit_serialization_skips_missing_payload() {
        let json = serde_json::to_string(&ScoredHit::new("doc-1", 0.5)).unwrap();
        assert!(json.contains("doc-1"));
        assert!(!json.contains("payload"));
    }

    #[test]
    fn test_payload_filter_matching() {
        let mut payload = Payload::new();
        payload.insert("lang".into(), json!("en"));
        payload.insert("year".into(), json!(2024));

        assert!(PayloadFilter::new().matches(None));
        assert!(PayloadFilter::new().with("lang", "en").matches(Some(&payload)));
        assert!(
            PayloadFilter::new()
                .with("lang", "en")
                .with("year", 2024)
                .matches(Some(&payload))
        );
        assert!(!PayloadFilter::new().with("lang", "de").matches(Some(&payload)));
        assert!(!PayloadFilter::new().with("missing", 1).matches(Some(&payload)));
        assert!(!PayloadFilter::new().with("lang", "en").matches(None));
    }

    proptest! {
        #[test]
        fn prop_sort_hits_is_deterministic(scores in proptest::collection::vec(0u8..4, 0..20)) {
            let hits: Vec<ScoredHit> = scores
                .iter()
                .enumerate()
                .map(|(i, s)| ScoredHit::new(format!("id-{i:02}"), *s as f32))
                .collect();

            let mut forward = hits.clone();
            let mut reversed: Vec<ScoredHit> = hits.into_iter().rev().collect();
            sort_hits(&mut forward);
            sort_hits(&mut reversed);
            prop_assert_eq!(forward, reversed);
        }
    }
}
