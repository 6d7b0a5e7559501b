//! Evaluation runs over a labelled query set.
//!
//! ```text
//!   QueryCase ─► HybridRetriever::retrieve(top_k) ─► ids ─► Metric::score
//!                                                             │
//!                        per-query scores ◄───────────────────┘
//!                               │ mean
//!                               ▼
//!                      EvaluationReport.means
//! ```

use quiver_core::{Error, Result};
use quiver_retrieval::HybridRetriever;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::metrics::Metric;
use crate::queryset::QueryCase;

/// Scores for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryScores {
    /// Query text.
    pub query: String,
    /// Ids retrieved, best first.
    pub retrieved: Vec<String>,
    /// Metric values for this query.
    pub scores: BTreeMap<Metric, f64>,
    /// Modules that degraded while answering this query.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<String>,
}

/// Aggregate result of one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Cutoff used for every query.
    pub top_k: usize,
    /// Arithmetic mean per metric across all queries.
    pub means: BTreeMap<Metric, f64>,
    /// Per-query breakdown, in query-set order.
    pub per_query: Vec<QueryScores>,
}

impl EvaluationReport {
    /// Mean score for `metric`, if it was computed.
    pub fn mean(&self, metric: Metric) -> Option<f64> {
        self.means.get(&metric).copied()
    }

    /// Number of queries on which at least one module degraded.
    pub fn degraded_queries(&self) -> usize {
        self.per_query.iter().filter(|q| !q.degraded.is_empty()).count()
    }
}

/// One configuration's standing in a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedConfiguration {
    /// Configuration name.
    pub name: String,
    /// Mean of the primary metric.
    pub score: f64,
    /// Full report.
    pub report: EvaluationReport,
}

/// Scores retrievers against labelled queries.
#[derive(Debug, Clone)]
pub struct EvaluationEngine {
    top_k: usize,
    metrics: Vec<Metric>,
}

impl EvaluationEngine {
    /// Create an engine. An empty metric list means every metric.
    pub fn new(top_k: usize, metrics: &[Metric]) -> Result<Self> {
        if top_k == 0 {
            return Err(Error::config("top_k must be greater than 0"));
        }
        let mut metrics = if metrics.is_empty() {
            Metric::ALL.to_vec()
        } else {
            metrics.to_vec()
        };
        metrics.sort();
        metrics.dedup();
        Ok(Self { top_k, metrics })
    }

    /// Cutoff in effect.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Metrics computed, in report order.
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// Run every case through `retriever` and score it.
    pub async fn evaluate(
        &self,
        retriever: &HybridRetriever,
        cases: &[QueryCase],
    ) -> Result<EvaluationReport> {
        if cases.is_empty() {
            return Err(Error::invalid_data("Query set is empty"));
        }

        let mut per_query = Vec::with_capacity(cases.len());
        for case in cases {
            let outcome = retriever.retrieve(&case.query, self.top_k, None).await?;
            let retrieved: Vec<String> = outcome.hits.into_iter().map(|h| h.id).collect();
            let relevant = case.relevant_set();

            let scores = self
                .metrics
                .iter()
                .map(|m| (*m, m.score(&retrieved, &relevant, self.top_k)))
                .collect();

            per_query.push(QueryScores {
                query: case.query.clone(),
                retrieved,
                scores,
                degraded: outcome.degraded.into_iter().map(|d| d.module).collect(),
            });
        }

        let count = per_query.len() as f64;
        let means = self
            .metrics
            .iter()
            .map(|m| {
                let total: f64 = per_query.iter().filter_map(|q| q.scores.get(m)).sum();
                (*m, total / count)
            })
            .collect();

        let report = EvaluationReport {
            top_k: self.top_k,
            means,
            per_query,
        };
        log::info!(
            "Evaluated {} queries at k={} ({} degraded)",
            cases.len(),
            self.top_k,
            report.degraded_queries()
        );
        Ok(report)
    }

    /// Evaluate several named retrievers on the same cases and rank them.
    ///
    /// Ranking is descending by the mean of `primary`, ties by name.
    /// `primary` is computed even if the engine was not configured with it.
    pub async fn compare(
        &self,
        configurations: &[(String, &HybridRetriever)],
        cases: &[QueryCase],
        primary: Metric,
    ) -> Result<Vec<RankedConfiguration>> {
        let engine = if self.metrics.contains(&primary) {
            self.clone()
        } else {
            let mut metrics = self.metrics.clone();
            metrics.push(primary);
            Self::new(self.top_k, &metrics)?
        };

        let mut ranked = Vec::with_capacity(configurations.len());
        for (name, retriever) in configurations {
            let report = engine.evaluate(retriever, cases).await?;
            let score = report.mean(primary).unwrap_or(0.0);
            log::debug!("Configuration '{name}': {primary} = {score:.4}");
            ranked.push(RankedConfiguration {
                name: name.clone(),
                score,
                report,
            });
        }

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
        Ok(ranked)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quiver_core::{PayloadFilter, ScoredHit};
    use quiver_retrieval::{RetrievalModule, RetrievalOptions};
    use std::sync::Arc;

    /// Returns a fixed ranking per query text.
    struct ScriptedModule {
        name: &'static str,
        answers: Answers,
    }

    #[async_trait]
    impl RetrievalModule for ScriptedModule {
        fn name(&self) -> &str {
            self.name
        }

        async fn retrieve(
            &self,
            query: &str,
            top_k: usize,
            _filter: Option<&PayloadFilter>,
        ) -> quiver_core::Result<Vec<ScoredHit>> {
            let ids = self
                .answers
                .iter()
                .find(|(q, _)| *q == query)
                .map(|(_, ids)| ids.clone())
                .unwrap_or_default();
            Ok(ids
                .into_iter()
                .take(top_k)
                .enumerate()
                .map(|(i, id)| ScoredHit::new(id, 1.0 / (i + 1) as f32))
                .collect())
        }
    }

    type Answers = Vec<(&'static str, Vec<&'static str>)>;

    fn retriever(name: &'static str, answers: Answers) -> HybridRetriever {
        HybridRetriever::new(RetrievalOptions::default()).with_module(
            Arc::new(ScriptedModule { name, answers }),
            1.0,
            10,
        )
    }

    fn cases() -> Vec<QueryCase> {
        vec![
            QueryCase::new("q1", ["d1", "d3"]),
            QueryCase::new("q2", ["d5"]),
        ]
    }

    #[tokio::test]
    async fn test_evaluate_means_and_per_query() {
        let r = retriever(
            "scripted",
            vec![
                ("q1", vec!["d2", "d1", "d4", "d3"]),
                ("q2", vec!["d5", "d6"]),
            ],
        );
        let engine = EvaluationEngine::new(4, &[]).unwrap();
        let report = engine.evaluate(&r, &cases()).await.unwrap();

        assert_eq!(report.per_query.len(), 2);
        let q1 = &report.per_query[0];
        assert_eq!(q1.retrieved, vec!["d2", "d1", "d4", "d3"]);
        assert!((q1.scores[&Metric::Precision] - 0.5).abs() < 1e-9);
        assert!((q1.scores[&Metric::Mrr] - 0.5).abs() < 1e-9);

        // q2: precision 0.5, recall 1, mrr 1.
        assert!((report.mean(Metric::Precision).unwrap() - 0.5).abs() < 1e-9);
        assert!((report.mean(Metric::Recall).unwrap() - 1.0).abs() < 1e-9);
        assert!((report.mean(Metric::Mrr).unwrap() - 0.75).abs() < 1e-9);
        assert_eq!(report.degraded_queries(), 0);
    }

    #[tokio::test]
    async fn test_evaluate_selected_metrics_only() {
        let r = retriever("scripted", vec![("q1", vec!["d1"])]);
        let engine = EvaluationEngine::new(5, &[Metric::Recall, Metric::Recall]).unwrap();
        assert_eq!(engine.metrics(), &[Metric::Recall]);

        let report = engine.evaluate(&r, &cases()).await.unwrap();
        assert_eq!(report.means.len(), 1);
        assert!(report.mean(Metric::F1).is_none());
        assert!((report.mean(Metric::Recall).unwrap() - 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_evaluate_rejects_bad_input() {
        assert!(EvaluationEngine::new(0, &[]).is_err());
        let engine = EvaluationEngine::new(3, &[]).unwrap();
        let r = retriever("scripted", vec![]);
        assert!(engine.evaluate(&r, &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_compare_ranks_by_primary_metric() {
        let good = retriever("good", vec![("q1", vec!["d1", "d3"]), ("q2", vec!["d5"])]);
        let poor = retriever("poor", vec![("q1", vec!["d9", "d1"]), ("q2", vec![])]);
        let same = retriever("same", vec![("q1", vec!["d1", "d3"]), ("q2", vec!["d5"])]);

        let engine = EvaluationEngine::new(3, &[Metric::Precision]).unwrap();
        let ranked = engine
            .compare(
                &[
                    ("poor".to_string(), &poor),
                    ("zeta".to_string(), &same),
                    ("alpha".to_string(), &good),
                ],
                &cases(),
                Metric::Ndcg,
            )
            .await
            .unwrap();

        let names: Vec<&str> = ranked.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta", "poor"]);
        assert!((ranked[0].score - 1.0).abs() < 1e-9);
        assert!(ranked[0].report.mean(Metric::Precision).is_some());
    }
}
