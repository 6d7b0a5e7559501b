//! Weighted Reciprocal Rank Fusion.
//!
//! Merges ranked lists whose scores live on different scales by looking only
//! at rank positions.
//!
//! # Algorithm
//!
//! Fused score for document `d`: `score(d) = Σ_m w_m / (k + rank_m(d))`
//!
//! Where `rank_m(d)` is the 1-based rank of `d` in module `m`'s list, `w_m`
//! the module weight, and `k` the smoothing constant (default 60). A
//! document absent from a list gets nothing from it.

use quiver_core::ScoredHit;
use std::collections::{HashMap, HashSet};

/// Default smoothing constant.
pub const DEFAULT_RRF_K: f32 = 60.0;

/// One module's contribution to a fusion.
#[derive(Debug, Clone)]
pub struct RankedList {
    /// Linear multiplier on this list's reciprocal-rank terms.
    pub weight: f32,
    /// Hits, best first.
    pub hits: Vec<ScoredHit>,
}

impl RankedList {
    /// Wrap a ranked result with its weight.
    pub fn new(weight: f32, hits: Vec<ScoredHit>) -> Self {
        Self { weight, hits }
    }
}

/// Fuse `lists` and keep the best `top_k`.
///
/// Output is sorted descending by fused score, ties by ascending id. If an
/// id repeats within one list only its best rank counts. Each hit carries
/// the first payload seen for its id, in list order.
pub fn weighted_rrf(lists: &[RankedList], k: f32, top_k: usize) -> Vec<ScoredHit> {
    let mut fused: HashMap<&str, (f64, Option<&ScoredHit>)> = HashMap::new();

    for list in lists {
        let mut seen: HashSet<&str> = HashSet::with_capacity(list.hits.len());
        for (rank, hit) in list.hits.iter().enumerate() {
            if !seen.insert(hit.id.as_str()) {
                continue;
            }
            let contribution = f64::from(list.weight) / (f64::from(k) + (rank + 1) as f64);
            let entry = fused.entry(hit.id.as_str()).or_insert((0.0, None));
            entry.0 += contribution;
            if entry.1.is_none_or(|h| h.payload.is_none()) && hit.payload.is_some() {
                entry.1 = Some(hit);
            }
        }
    }

    // Rank on the f64 sums; sums closer than f32 precision still order
    // by score rather than by id.
    let mut ranked: Vec<(&str, f64, Option<&ScoredHit>)> = fused
        .into_iter()
        .map(|(id, (score, source))| (id, score, source))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(top_k);

    ranked
        .into_iter()
        .map(|(id, score, source)| ScoredHit {
            id: id.to_string(),
            score: score as f32,
            payload: source.and_then(|h| h.payload.clone()),
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
