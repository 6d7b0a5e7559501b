//! Handler functions for ingest, query, evaluate and collection commands.
//!
//! Each handler validates the configuration, opens only the backends and
//! indexes it needs, and returns structured results for the caller to print.

use quiver_core::{Error, PayloadFilter, Result, parse_json_records};
use quiver_eval::{EvaluationEngine, Metric, RankedConfiguration, load_query_set};
use quiver_fts::{Bm25Index, LexicalDocument, LexicalIndex};
use quiver_retrieval::{HybridRetriever, ModuleConfig, RetrievalOutcome, RetrievalTargets};
use quiver_vector::{
    BackendConfig, CollectionInfo, EmbeddingProvider, FailedRecord, IngestDocument,
    IngestReport, IngestionPipeline, VectorIndexBackend, create_backend,
    create_embedding_provider,
};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::config::QuiverConfig;

// ============================================================================
// Runtime wiring
// ============================================================================

struct DenseTarget {
    config: BackendConfig,
    backend: Arc<dyn VectorIndexBackend>,
    provider: Arc<dyn EmbeddingProvider>,
}

/// Backends and lexical indexes opened for one command.
struct Runtime {
    dense: BTreeMap<String, DenseTarget>,
    lexical: BTreeMap<String, Arc<dyn LexicalIndex>>,
}

impl Runtime {
    /// Open every backend and lexical index whose name `wanted` accepts.
    fn open(config: &QuiverConfig, wanted: impl Fn(&str) -> bool) -> Result<Self> {
        let mut dense = BTreeMap::new();
        for backend_config in config.backends.iter().filter(|b| wanted(&b.name)) {
            let backend = create_backend(backend_config)?;
            let provider = create_embedding_provider(&backend_config.embedding)?;
            dense.insert(
                backend_config.name.clone(),
                DenseTarget {
                    config: backend_config.clone(),
                    backend,
                    provider,
                },
            );
        }

        let mut lexical = BTreeMap::new();
        for index_config in config.lexical.iter().filter(|l| wanted(&l.name)) {
            let index: Arc<dyn LexicalIndex> = Arc::new(Bm25Index::from_config(index_config)?);
            lexical.insert(index_config.name.clone(), index);
        }

        Ok(Self { dense, lexical })
    }

    fn targets(&self) -> RetrievalTargets {
        let mut targets = RetrievalTargets::new();
        for (name, target) in &self.dense {
            targets.add_dense(
                name.clone(),
                Arc::clone(&target.backend),
                Arc::clone(&target.provider),
                target.config.collection.clone(),
            );
        }
        for (name, index) in &self.lexical {
            targets.add_lexical(name.clone(), Arc::clone(index));
        }
        targets
    }
}

/// Select modules by name, all of them when `names` is empty.
fn select_modules<'a>(
    config: &'a QuiverConfig,
    names: &[String],
) -> Result<Vec<&'a ModuleConfig>> {
    if config.modules.is_empty() {
        return Err(Error::config("No retrieval modules configured"));
    }
    if names.is_empty() {
        return Ok(config.modules.iter().collect());
    }
    names
        .iter()
        .map(|name| {
            config
                .modules
                .iter()
                .find(|m| &m.name == name)
                .ok_or_else(|| Error::config(format!("Unknown module: {name}")))
        })
        .collect()
}

fn open_for_modules(config: &QuiverConfig, modules: &[&ModuleConfig]) -> Result<Runtime> {
    let needed: HashSet<&str> = modules.iter().map(|m| m.target.as_str()).collect();
    Runtime::open(config, |name| needed.contains(name))
}

fn build_retriever(
    config: &QuiverConfig,
    modules: &[&ModuleConfig],
    targets: &RetrievalTargets,
) -> Result<HybridRetriever> {
    let owned: Vec<ModuleConfig> = modules.iter().map(|m| (*m).clone()).collect();
    HybridRetriever::from_config(&owned, config.retrieval.clone(), targets)
}

/// Load ingestion documents from a JSON array or JSONL file.
pub fn load_documents(path: &Path) -> Result<Vec<IngestDocument>> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
    parse_json_records(&content, "Document file")
}

/// Parse `key=value` filters; values that parse as JSON keep their type.
pub fn parse_filters(filters: &[String]) -> Result<Option<PayloadFilter>> {
    if filters.is_empty() {
        return Ok(None);
    }
    let mut filter = PayloadFilter::new();
    for raw in filters {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| Error::config(format!("Filter must be key=value, got '{raw}'")))?;
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        filter = filter.with(key.trim(), value);
    }
    Ok(Some(filter))
}

// ============================================================================
// Command handlers
// ============================================================================

/// One target's ingestion result.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TargetReport {
    /// Backend or lexical index name.
    pub target: String,
    /// Committed and failed ids.
    pub report: IngestReport,
}

/// Ingest `documents` into the named targets (all when `targets` is empty).
pub async fn handle_ingest(
    config: &QuiverConfig,
    documents: Vec<IngestDocument>,
    targets: &[String],
) -> Result<Vec<TargetReport>> {
    config.validate()?;
    for name in targets {
        if config.backend(name).is_none() && config.lexical_index(name).is_none() {
            return Err(Error::config(format!("Unknown ingest target: {name}")));
        }
    }

    let runtime = Runtime::open(config, |name| {
        targets.is_empty() || targets.iter().any(|t| t == name)
    })?;
    let mut reports = Vec::new();

    for (name, target) in &runtime.dense {
        let pipeline = IngestionPipeline::from_config(
            &target.config,
            Arc::clone(&target.backend),
            Arc::clone(&target.provider),
        );
        let report = pipeline.ingest(documents.clone()).await?;
        if let Err(e) = target.backend.flush().await {
            tracing::warn!(backend = %name, error = %e, "flush failed after ingest");
        }
        tracing::info!(
            backend = %name,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "ingested into backend"
        );
        reports.push(TargetReport {
            target: name.clone(),
            report,
        });
    }

    for (name, index) in &runtime.lexical {
        let ids: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();
        let lexical_docs = documents
            .iter()
            .map(|d| LexicalDocument {
                id: d.id.clone(),
                text: d.text.clone(),
                metadata: d.metadata.clone(),
            })
            .collect();
        let outcome = match index.upsert(lexical_docs).await {
            Ok(_) => index.flush().await,
            Err(e) => Err(e),
        };
        let report = match outcome {
            Ok(()) => IngestReport {
                succeeded: ids,
                failed: Vec::new(),
            },
            Err(e) => {
                let error = e.to_string();
                IngestReport {
                    succeeded: Vec::new(),
                    failed: ids
                        .into_iter()
                        .map(|id| FailedRecord {
                            id,
                            error: error.clone(),
                        })
                        .collect(),
                }
            }
        };
        tracing::info!(index = %name, documents = index.len(), "updated lexical index");
        reports.push(TargetReport {
            target: name.clone(),
            report,
        });
    }

    Ok(reports)
}

/// Run one query through the selected modules.
pub async fn handle_query(
    config: &QuiverConfig,
    text: &str,
    top_k: Option<usize>,
    module_names: &[String],
    filter: Option<&PayloadFilter>,
) -> Result<RetrievalOutcome> {
    config.validate()?;
    let modules = select_modules(config, module_names)?;
    let runtime = open_for_modules(config, &modules)?;
    let retriever = build_retriever(config, &modules, &runtime.targets())?;

    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    retriever.retrieve(text, top_k, filter).await
}

/// Evaluate the fused configuration, and each module alone with `compare`.
///
/// Results are ranked by `primary`; without `compare` there is one entry,
/// named `hybrid`.
pub async fn handle_evaluate(
    config: &QuiverConfig,
    file: &Path,
    top_k: Option<usize>,
    metrics: &[Metric],
    compare: bool,
    primary: Metric,
) -> Result<Vec<RankedConfiguration>> {
    config.validate()?;
    let cases = load_query_set(file)?;
    let modules = select_modules(config, &[])?;
    let runtime = open_for_modules(config, &modules)?;
    let targets = runtime.targets();

    let engine = EvaluationEngine::new(top_k.unwrap_or(config.retrieval.top_k), metrics)?;

    let hybrid = build_retriever(config, &modules, &targets)?;
    let mut singles = Vec::new();
    if compare {
        for module in &modules {
            let retriever = build_retriever(config, &[*module], &targets)?;
            singles.push((module.name.clone(), retriever));
        }
    }

    let mut configurations: Vec<(String, &HybridRetriever)> =
        vec![("hybrid".to_string(), &hybrid)];
    configurations.extend(singles.iter().map(|(name, r)| (name.clone(), r)));

    engine.compare(&configurations, &cases, primary).await
}

/// Describe a backend's collection.
pub async fn handle_collection_info(
    config: &QuiverConfig,
    backend_name: &str,
) -> Result<Option<CollectionInfo>> {
    let (backend, collection) = open_backend(config, backend_name)?;
    backend.collection_info(&collection).await
}

/// Delete a backend's collection.
pub async fn handle_collection_delete(config: &QuiverConfig, backend_name: &str) -> Result<()> {
    let (backend, collection) = open_backend(config, backend_name)?;
    backend.delete_collection(&collection).await?;
    backend.flush().await?;
    tracing::info!(backend = %backend_name, collection = %collection, "deleted collection");
    Ok(())
}

fn open_backend(
    config: &QuiverConfig,
    name: &str,
) -> Result<(Arc<dyn VectorIndexBackend>, String)> {
    let backend_config = config
        .backend(name)
        .ok_or_else(|| Error::config(format!("Unknown backend: {name}")))?;
    Ok((create_backend(backend_config)?, backend_config.collection.clone()))
}

// ============================================================================
// Tests
// ============================================================================
