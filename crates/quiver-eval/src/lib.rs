//! Retrieval-quality evaluation for Quiver.
//!
//! Runs a labelled query set through a [`quiver_retrieval::HybridRetriever`]
//! and scores each ranking with binary-relevance IR metrics:
//!
//! - [`Metric::Precision`], [`Metric::Recall`], [`Metric::F1`] at k
//! - [`Metric::Ndcg`] at k
//! - [`Metric::Mrr`]
//!
//! Run-level scores are arithmetic means over the query set.
//! [`EvaluationEngine::compare`] ranks several retriever configurations by a
//! chosen metric.

pub mod engine;
pub mod metrics;
pub mod queryset;

pub use engine::{EvaluationEngine, EvaluationReport, QueryScores, RankedConfiguration};
pub use metrics::Metric;
pub use queryset::{QueryCase, load_query_set, parse_query_set};
