//! Per-query retrieval metrics.
//!
//! All functions take the retrieved ids in rank order (best first) and the
//! ground-truth relevant set. Relevance is binary. [`Metric::score`] cuts the
//! list to the run's `k` before scoring.

use quiver_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// A named retrieval-quality metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Fraction of retrieved ids that are relevant.
    #[serde(alias = "retrieval_precision")]
    Precision,
    /// Fraction of relevant ids that were retrieved.
    #[serde(alias = "retrieval_recall")]
    Recall,
    /// Harmonic mean of precision and recall.
    #[serde(alias = "retrieval_f1")]
    F1,
    /// Normalised discounted cumulative gain.
    #[serde(alias = "retrieval_ndcg")]
    Ndcg,
    /// Reciprocal rank of the first relevant id.
    #[serde(alias = "retrieval_mrr")]
    Mrr,
}

impl Metric {
    /// Every metric, in report order.
    pub const ALL: [Metric; 5] = [
        Metric::Precision,
        Metric::Recall,
        Metric::F1,
        Metric::Ndcg,
        Metric::Mrr,
    ];

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Precision => "precision",
            Self::Recall => "recall",
            Self::F1 => "f1",
            Self::Ndcg => "ndcg",
            Self::Mrr => "mrr",
        }
    }

    /// Score one query at cutoff `k`.
    pub fn score(&self, retrieved: &[String], relevant: &HashSet<String>, k: usize) -> f64 {
        let retrieved = &retrieved[..retrieved.len().min(k)];
        match self {
            Self::Precision => precision(retrieved, relevant),
            Self::Recall => recall(retrieved, relevant),
            Self::F1 => f1(retrieved, relevant),
            Self::Ndcg => ndcg(retrieved, relevant, k),
            Self::Mrr => reciprocal_rank(retrieved, relevant),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let name = lower.strip_prefix("retrieval_").unwrap_or(&lower);
        match name {
            "precision" => Ok(Self::Precision),
            "recall" => Ok(Self::Recall),
            "f1" => Ok(Self::F1),
            "ndcg" => Ok(Self::Ndcg),
            "mrr" => Ok(Self::Mrr),
            other => Err(Error::config(format!("Unknown metric: {other}"))),
        }
    }
}

fn hits(retrieved: &[String], relevant: &HashSet<String>) -> usize {
    retrieved.iter().filter(|id| relevant.contains(*id)).count()
}

/// `|retrieved ∩ relevant| / |retrieved|`, 0 when nothing was retrieved.
pub fn precision(retrieved: &[String], relevant: &HashSet<String>) -> f64 {
    if retrieved.is_empty() {
        return 0.0;
    }
    hits(retrieved, relevant) as f64 / retrieved.len() as f64
}

/// `|retrieved ∩ relevant| / |relevant|`, 0 when nothing is relevant.
pub fn recall(retrieved: &[String], relevant: &HashSet<String>) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    hits(retrieved, relevant) as f64 / relevant.len() as f64
}

/// Harmonic mean of precision and recall, 0 when both are 0.
pub fn f1(retrieved: &[String], relevant: &HashSet<String>) -> f64 {
    let p = precision(retrieved, relevant);
    let r = recall(retrieved, relevant);
    if p + r == 0.0 {
        0.0
    } else {
        2.0 * p * r / (p + r)
    }
}

/// Binary-relevance NDCG@k.
///
/// The ideal ordering places `min(|relevant|, k)` relevant ids first.
/// Returns 0 when the ideal DCG is 0.
pub fn ndcg(retrieved: &[String], relevant: &HashSet<String>, k: usize) -> f64 {
    let dcg: f64 = retrieved
        .iter()
        .take(k)
        .enumerate()
        .filter(|(_, id)| relevant.contains(*id))
        .map(|(i, _)| discount(i))
        .sum();

    let ideal: f64 = (0..relevant.len().min(k)).map(discount).sum();

    if ideal < f64::EPSILON {
        0.0
    } else {
        dcg / ideal
    }
}

/// `1 / log2(rank + 1)` for a 0-based position.
fn discount(position: usize) -> f64 {
    1.0 / (position as f64 + 2.0).log2()
}

/// `1 / rank` of the first relevant id, 0 if none was retrieved.
pub fn reciprocal_rank(retrieved: &[String], relevant: &HashSet<String>) -> f64 {
    retrieved
        .iter()
        .position(|id| relevant.contains(id))
        .map_or(0.0, |i| 1.0 / (i + 1) as f64)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reference_example() {
        let retrieved = strings(&["d2", "d1", "d4", "d3"]);
        let relevant = set(&["d1", "d3"]);

        assert!((precision(&retrieved, &relevant) - 0.5).abs() < 1e-9);
        assert!((recall(&retrieved, &relevant) - 1.0).abs() < 1e-9);
        assert!((f1(&retrieved, &relevant) - 2.0 / 3.0).abs() < 1e-9);
        assert!((reciprocal_rank(&retrieved, &relevant) - 0.5).abs() < 1e-9);

        // DCG = 1/log2(3) + 1/log2(5); IDCG = 1 + 1/log2(3).
        let expected = (1.0 / 3f64.log2() + 1.0 / 5f64.log2()) / (1.0 + 1.0 / 3f64.log2());
        assert!((ndcg(&retrieved, &relevant, 4) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_perfect_ranking() {
        let retrieved = strings(&["a", "b"]);
        let relevant = set(&["a", "b"]);
        for metric in Metric::ALL {
            assert!((metric.score(&retrieved, &relevant, 2) - 1.0).abs() < 1e-9, "{metric}");
        }
    }

    #[test]
    fn test_degenerate_inputs_score_zero() {
        let none: Vec<String> = Vec::new();
        let relevant = set(&["a"]);
        for metric in Metric::ALL {
            assert_eq!(metric.score(&none, &relevant, 5), 0.0);
            assert_eq!(metric.score(&strings(&["a"]), &HashSet::new(), 5), 0.0);
            assert_eq!(metric.score(&strings(&["a"]), &relevant, 0), 0.0);
        }
        assert_eq!(f1(&strings(&["x"]), &relevant), 0.0);
    }

    #[test]
    fn test_ndcg_ideal_is_capped_at_k() {
        // Three relevant ids but k = 1: a relevant top hit is ideal.
        let relevant = set(&["a", "b", "c"]);
        assert!((ndcg(&strings(&["a"]), &relevant, 1) - 1.0).abs() < 1e-9);
        // With k = 3 the same single hit falls short of the ideal.
        assert!(ndcg(&strings(&["a"]), &relevant, 3) < 1.0);
    }

    #[test]
    fn test_score_cuts_at_k() {
        let retrieved = strings(&["x", "a"]);
        let relevant = set(&["a"]);
        assert_eq!(Metric::Recall.score(&retrieved, &relevant, 1), 0.0);
        assert_eq!(Metric::Recall.score(&retrieved, &relevant, 2), 1.0);
        assert!((Metric::Mrr.score(&retrieved, &relevant, 10) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("ndcg".parse::<Metric>().unwrap(), Metric::Ndcg);
        assert_eq!("retrieval_f1".parse::<Metric>().unwrap(), Metric::F1);
        assert_eq!("MRR".parse::<Metric>().unwrap(), Metric::Mrr);
        assert!("map".parse::<Metric>().is_err());

        let parsed: Vec<Metric> =
            serde_json::from_str(r#"["retrieval_recall", "precision"]"#).unwrap();
        assert_eq!(parsed, vec![Metric::Recall, Metric::Precision]);
        assert_eq!(serde_json::to_string(&Metric::Ndcg).unwrap(), r#""ndcg""#);
    }

    proptest! {
        #[test]
        fn prop_metrics_are_bounded(
            retrieved in proptest::collection::hash_set(0u8..30, 0..10),
            relevant in proptest::collection::hash_set(0u8..30, 0..10),
        ) {
            let retrieved: Vec<String> = retrieved.iter().map(|n| format!("d{n}")).collect();
            let relevant: HashSet<String> = relevant.iter().map(|n| format!("d{n}")).collect();
            for metric in Metric::ALL {
                let score = metric.score(&retrieved, &relevant, 10);
                prop_assert!((0.0..=1.0 + 1e-9).contains(&score), "{} = {}", metric, score);
            }
        }
    }
}
