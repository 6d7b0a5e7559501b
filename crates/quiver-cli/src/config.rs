//! Configuration for the Quiver CLI.
//!
//! Provides the [`QuiverConfig`] struct that loads from TOML files,
//! environment variables, and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit `--config <path>` flag
//! 2. `QUIVER_CONFIG` environment variable
//! 3. XDG default: `~/.config/quiver/config.toml`
//! 4. Built-in defaults
//!
//! # Shape
//!
//! ```toml
//! [[backends]]
//! name = "default"
//! collection = "documents"
//! metric = "cosine"
//! engine = { type = "memory", path = "/var/lib/quiver/vectors.json" }
//! embedding = { provider = "mock", model = "mock", dimension = 384 }
//! ingest = { batch_size = 64, parallelism = 2, max_retries = 3 }
//!
//! [[lexical]]
//! name = "keywords"
//! path = "/var/lib/quiver/keywords"
//!
//! [[modules]]
//! name = "dense"
//! kind = "dense"
//! target = "default"
//!
//! [[modules]]
//! name = "bm25"
//! kind = "lexical"
//! target = "keywords"
//! weight = 4.0
//!
//! [retrieval]
//! rrf_k = 60.0
//! module_timeout_ms = 5000
//! top_k = 10
//! ```

use confyg::{Confygery, env};
use quiver_core::{Error, Result};
use quiver_fts::LexicalConfig;
use quiver_retrieval::{ModuleConfig, ModuleKind, RetrievalOptions};
use quiver_vector::{BackendConfig, EngineConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

// ============================================================================
// Configuration structs
// ============================================================================

/// Main configuration for the Quiver CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuiverConfig {
    /// Vector backends, each bound to one collection.
    pub backends: Vec<BackendConfig>,

    /// Lexical (BM25) indexes.
    pub lexical: Vec<LexicalConfig>,

    /// Retrieval modules referencing backends or lexical indexes by name.
    pub modules: Vec<ModuleConfig>,

    /// Fusion and fan-out tuning.
    pub retrieval: RetrievalOptions,
}

// ============================================================================
// Default implementations
// ============================================================================

impl Default for QuiverConfig {
    /// A single persisted memory backend with mock embeddings, a keyword
    /// index, and one module over each.
    fn default() -> Self {
        let data_dir = Self::default_data_dir();
        let data_file = |file: &str| {
            data_dir
                .as_ref()
                .map(|d| d.join(file).to_string_lossy().into_owned())
        };

        let mut backend = BackendConfig::new("default", "documents");
        backend.engine = EngineConfig::Memory {
            path: data_file("vectors.json"),
        };

        let mut lexical = LexicalConfig::new("keywords");
        lexical.path = data_file("keywords");

        Self {
            backends: vec![backend],
            lexical: vec![lexical],
            modules: vec![
                ModuleConfig::new("dense", ModuleKind::Dense, "default"),
                ModuleConfig::new("bm25", ModuleKind::Lexical, "keywords"),
            ],
            retrieval: RetrievalOptions::default(),
        }
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl QuiverConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path)
            && path.exists()
        {
            builder
                .add_file(&path.to_string_lossy())
                .map_err(|e| Error::config(format!("config file: {e}")))?;
        }

        let mut env_opts = env::Options::with_top_level("QUIVER");
        env_opts.add_section("retrieval");
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        let config: Self = builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))?;

        Ok(config)
    }

    /// Resolve the config file path from explicit flag, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("QUIVER_CONFIG") {
            return Some(PathBuf::from(path));
        }

        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("quiver").join("config.toml"))
    }

    /// Directory for snapshots and index files in the default configuration.
    pub fn default_data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("quiver"))
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Look up a backend by name.
    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.name == name)
    }

    /// Look up a lexical index by name.
    pub fn lexical_index(&self, name: &str) -> Option<&LexicalConfig> {
        self.lexical.iter().find(|l| l.name == name)
    }

    /// Reject configurations that cannot be wired up.
    pub fn validate(&self) -> Result<()> {
        let mut targets = HashSet::new();
        let names = self
            .backends
            .iter()
            .map(|b| &b.name)
            .chain(self.lexical.iter().map(|l| &l.name));
        for name in names {
            if !targets.insert(name.as_str()) {
                return Err(Error::config(format!(
                    "Duplicate backend or lexical index name: {name}"
                )));
            }
        }

        let mut snapshot_paths = HashSet::new();
        for backend in &self.backends {
            backend.ingest.validate()?;
            if backend.dimension == Some(0) {
                return Err(Error::config(format!(
                    "backend '{}': dimension must be greater than 0",
                    backend.name
                )));
            }
            if let EngineConfig::Memory { path: Some(path) } = &backend.engine
                && !snapshot_paths.insert(path.as_str())
            {
                return Err(Error::config(format!(
                    "backend '{}': snapshot {path} is already used by another backend",
                    backend.name
                )));
            }
        }
        for index in &self.lexical {
            if let Some(path) = &index.path
                && !snapshot_paths.insert(path.as_str())
            {
                return Err(Error::config(format!(
                    "lexical index '{}': index path {path} is already used",
                    index.name
                )));
            }
        }

        let mut modules = HashSet::new();
        for module in &self.modules {
            if !modules.insert(module.name.as_str()) {
                return Err(Error::config(format!(
                    "Duplicate module name: {}",
                    module.name
                )));
            }
            let known = match module.kind {
                ModuleKind::Dense => self.backend(&module.target).is_some(),
                ModuleKind::Lexical => self.lexical_index(&module.target).is_some(),
            };
            if !known {
                return Err(Error::config(format!(
                    "Module '{}' references unknown {} target '{}'",
                    module.name, module.kind, module.target
                )));
            }
            if !module.weight.is_finite() || module.weight <= 0.0 {
                return Err(Error::config(format!(
                    "Module '{}' weight must be positive, got {}",
                    module.name, module.weight
                )));
            }
            if module.top_k == 0 {
                return Err(Error::config(format!(
                    "Module '{}' top_k must be greater than 0",
                    module.name
                )));
            }
        }

        self.retrieval.validate()
    }
}

// ============================================================================
// Tests
// ============================================================================
