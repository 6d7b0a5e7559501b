//! Hybrid retrieval: concurrent fan-out over modules, then weighted RRF.
//!
//! ```text
//!                      query
//!                        │
//!         ┌──────────────┼──────────────┐
//!         ▼              ▼              ▼
//!   dense module   lexical module     ...      (each under module_timeout)
//!         │              │              │
//!         └──── ranked lists (weight) ──┘
//!                        │
//!                  weighted_rrf(k)
//!                        ▼
//!          RetrievalOutcome { hits, degraded }
//! ```
//!
//! A module that errors or times out contributes nothing to the fusion and is
//! listed in [`RetrievalOutcome::degraded`]; the call itself still succeeds.

use futures::future::join_all;
use quiver_core::{Error, PayloadFilter, Result, ScoredHit};
use quiver_fts::LexicalIndex;
use quiver_vector::{EmbeddingProvider, VectorIndexBackend};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::fusion::{DEFAULT_RRF_K, RankedList, weighted_rrf};
use crate::module::{DenseModule, LexicalModule, RetrievalModule};

// ============================================================================
// Configuration
// ============================================================================

/// What a retrieval module searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// Vector similarity over a backend collection.
    Dense,
    /// BM25 keyword search over a lexical index.
    Lexical,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dense => f.write_str("dense"),
            Self::Lexical => f.write_str("lexical"),
        }
    }
}

impl FromStr for ModuleKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dense" | "vector" => Ok(Self::Dense),
            "lexical" | "bm25" | "keyword" => Ok(Self::Lexical),
            other => Err(Error::config(format!("Unknown module type: {other}"))),
        }
    }
}

/// One retrieval module definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Unique module name.
    pub name: String,

    /// Module type.
    pub kind: ModuleKind,

    /// Backend name (dense) or lexical index name (lexical).
    pub target: String,

    /// Linear multiplier on this module's RRF contribution.
    #[serde(default = "default_weight")]
    pub weight: f32,

    /// Candidates requested from this module.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl ModuleConfig {
    /// Create a module definition with weight 1.0 and top_k 10.
    pub fn new(name: impl Into<String>, kind: ModuleKind, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            weight: default_weight(),
            top_k: default_top_k(),
        }
    }

    /// Set the fusion weight.
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    /// Set the per-module candidate count.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

/// Fusion and fan-out tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalOptions {
    /// RRF smoothing constant.
    pub rrf_k: f32,

    /// Per-module time limit in milliseconds.
    pub module_timeout_ms: u64,

    /// Overall result count when the caller does not give one.
    pub top_k: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
            module_timeout_ms: 5000,
            top_k: default_top_k(),
        }
    }
}

impl RetrievalOptions {
    /// Per-module time limit.
    pub fn module_timeout(&self) -> Duration {
        Duration::from_millis(self.module_timeout_ms)
    }

    /// Reject unusable tuning.
    pub fn validate(&self) -> Result<()> {
        if !self.rrf_k.is_finite() || self.rrf_k < 0.0 {
            return Err(Error::config(format!(
                "rrf_k must be a non-negative number, got {}",
                self.rrf_k
            )));
        }
        if self.module_timeout_ms == 0 {
            return Err(Error::config("module_timeout_ms must be greater than 0"));
        }
        if self.top_k == 0 {
            return Err(Error::config("top_k must be greater than 0"));
        }
        Ok(())
    }
}

fn default_weight() -> f32 {
    1.0
}

fn default_top_k() -> usize {
    10
}

// ============================================================================
// Targets
// ============================================================================

struct DenseTarget {
    backend: Arc<dyn VectorIndexBackend>,
    provider: Arc<dyn EmbeddingProvider>,
    collection: String,
}

/// Named backends and lexical indexes that module definitions refer to.
#[derive(Default)]
pub struct RetrievalTargets {
    dense: HashMap<String, DenseTarget>,
    lexical: HashMap<String, Arc<dyn LexicalIndex>>,
}

impl RetrievalTargets {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend collection under `name`.
    pub fn add_dense(
        &mut self,
        name: impl Into<String>,
        backend: Arc<dyn VectorIndexBackend>,
        provider: Arc<dyn EmbeddingProvider>,
        collection: impl Into<String>,
    ) -> &mut Self {
        self.dense.insert(
            name.into(),
            DenseTarget {
                backend,
                provider,
                collection: collection.into(),
            },
        );
        self
    }

    /// Register a lexical index under `name`.
    pub fn add_lexical(
        &mut self,
        name: impl Into<String>,
        index: Arc<dyn LexicalIndex>,
    ) -> &mut Self {
        self.lexical.insert(name.into(), index);
        self
    }

    fn build(&self, config: &ModuleConfig) -> Result<Arc<dyn RetrievalModule>> {
        match config.kind {
            ModuleKind::Dense => {
                let target = self.dense.get(&config.target).ok_or_else(|| {
                    Error::config(format!(
                        "Module '{}' references unknown backend '{}'",
                        config.name, config.target
                    ))
                })?;
                Ok(Arc::new(DenseModule::new(
                    config.name.clone(),
                    Arc::clone(&target.backend),
                    Arc::clone(&target.provider),
                    target.collection.clone(),
                )))
            }
            ModuleKind::Lexical => {
                let index = self.lexical.get(&config.target).ok_or_else(|| {
                    Error::config(format!(
                        "Module '{}' references unknown lexical index '{}'",
                        config.name, config.target
                    ))
                })?;
                Ok(Arc::new(LexicalModule::new(
                    config.name.clone(),
                    Arc::clone(index),
                )))
            }
        }
    }
}

// ============================================================================
// Retriever
// ============================================================================

/// A module that contributed nothing to a retrieval call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedModule {
    /// Module name.
    pub module: String,
    /// Why it was dropped.
    pub reason: String,
}

/// Fused hits plus the modules that were dropped from the fusion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    /// Fused ranking, best first.
    pub hits: Vec<ScoredHit>,
    /// Modules that timed out or failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<DegradedModule>,
}

impl RetrievalOutcome {
    /// Whether every module contributed.
    pub fn is_complete(&self) -> bool {
        self.degraded.is_empty()
    }
}

struct Slot {
    module: Arc<dyn RetrievalModule>,
    weight: f32,
    top_k: usize,
}

/// Queries every configured module concurrently and fuses their rankings.
pub struct HybridRetriever {
    slots: Vec<Slot>,
    options: RetrievalOptions,
}

impl HybridRetriever {
    /// Create a retriever with no modules.
    pub fn new(options: RetrievalOptions) -> Self {
        Self {
            slots: Vec::new(),
            options,
        }
    }

    /// Add a module with its fusion weight and candidate count.
    pub fn with_module(
        mut self,
        module: Arc<dyn RetrievalModule>,
        weight: f32,
        top_k: usize,
    ) -> Self {
        self.slots.push(Slot {
            module,
            weight,
            top_k,
        });
        self
    }

    /// Build and validate a retriever from module definitions.
    pub fn from_config(
        modules: &[ModuleConfig],
        options: RetrievalOptions,
        targets: &RetrievalTargets,
    ) -> Result<Self> {
        let mut retriever = Self::new(options);
        for config in modules {
            let module = targets.build(config)?;
            retriever = retriever.with_module(module, config.weight, config.top_k);
        }
        retriever.validate()?;
        Ok(retriever)
    }

    /// Reject configurations that cannot produce a ranking.
    pub fn validate(&self) -> Result<()> {
        self.options.validate()?;
        if self.slots.is_empty() {
            return Err(Error::config("At least one retrieval module is required"));
        }
        let mut names = std::collections::HashSet::new();
        for slot in &self.slots {
            let name = slot.module.name();
            if !names.insert(name) {
                return Err(Error::config(format!("Duplicate module name: {name}")));
            }
            if !slot.weight.is_finite() || slot.weight <= 0.0 {
                return Err(Error::config(format!(
                    "Module '{name}' weight must be positive, got {}",
                    slot.weight
                )));
            }
            if slot.top_k == 0 {
                return Err(Error::config(format!(
                    "Module '{name}' top_k must be greater than 0"
                )));
            }
        }
        Ok(())
    }

    /// Tuning in effect.
    pub fn options(&self) -> &RetrievalOptions {
        &self.options
    }

    /// Names of the configured modules, in configuration order.
    pub fn module_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.module.name()).collect()
    }

    /// Run `query` through every module and fuse the results.
    ///
    /// Only configuration problems (`top_k` of zero, invalid weights) are
    /// returned as `Err`. Module failures and timeouts degrade to empty
    /// contributions.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<RetrievalOutcome> {
        if top_k == 0 {
            return Err(Error::config("top_k must be greater than 0"));
        }
        self.validate()?;

        let limit = self.options.module_timeout();
        let calls = self.slots.iter().map(|slot| async move {
            let result =
                tokio::time::timeout(limit, slot.module.retrieve(query, slot.top_k, filter)).await;
            (slot, result)
        });
        let responses = join_all(calls).await;

        let mut lists = Vec::with_capacity(responses.len());
        let mut degraded = Vec::new();
        for (slot, response) in responses {
            let name = slot.module.name();
            let reason = match response {
                Ok(Ok(hits)) => {
                    log::debug!("Module '{name}' returned {} hits", hits.len());
                    lists.push(RankedList::new(slot.weight, hits));
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => Error::timeout(format!(
                    "module '{name}' exceeded {} ms",
                    self.options.module_timeout_ms
                ))
                .to_string(),
            };
            log::warn!("Retrieval module '{name}' degraded: {reason}");
            degraded.push(DegradedModule {
                module: name.to_string(),
                reason,
            });
        }

        let hits = weighted_rrf(&lists, self.options.rrf_k, top_k);
        Ok(RetrievalOutcome { hits, degraded })
    }
}

// ============================================================================
// Tests
// ============================================================================
