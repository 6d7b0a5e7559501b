//! Similarity scoring for exact (brute-force) search.
//!
//! Every metric is reported as a similarity where higher is better:
//! cosine similarity, raw dot product, and `1 / (1 + d)` for Euclidean
//! distance `d`.

use quiver_core::SimilarityMetric;

/// Score `a` against `b` under `metric`. Both slices must have equal length.
pub fn similarity(metric: SimilarityMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        SimilarityMetric::Cosine => cosine(a, b),
        SimilarityMetric::InnerProduct => dot(a, b),
        SimilarityMetric::Euclidean => euclidean_to_similarity(euclidean(a, b)),
    }
}

/// Convert an L2 distance into a similarity in `(0, 1]`.
pub fn euclidean_to_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    dot / denom
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        let a = [1.0, 0.0];
        assert!((similarity(SimilarityMetric::Cosine, &a, &a) - 1.0).abs() < 1e-6);
        assert!(similarity(SimilarityMetric::Cosine, &a, &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(similarity(SimilarityMetric::Cosine, &[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_dot_product() {
        let score = similarity(SimilarityMetric::InnerProduct, &[1.0, 2.0], &[3.0, 4.0]);
        assert!((score - 11.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_similarity() {
        let same = similarity(SimilarityMetric::Euclidean, &[1.0, 1.0], &[1.0, 1.0]);
        assert!((same - 1.0).abs() < 1e-6);

        // distance 5 -> 1/6
        let far = similarity(SimilarityMetric::Euclidean, &[0.0, 0.0], &[3.0, 4.0]);
        assert!((far - 1.0 / 6.0).abs() < 1e-6);
    }
}
