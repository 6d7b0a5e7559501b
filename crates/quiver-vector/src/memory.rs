//! In-process vector store with optional JSON snapshot persistence.
//!
//! Search is exact (brute force) under the collection's metric. Locks are
//! plain `std::sync::RwLock`s and are never held across an await point.

use async_trait::async_trait;
use quiver_core::{
    Error, Payload, PayloadFilter, Result, ScoredHit, SimilarityMetric, sort_hits,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::backend::{VectorIndexBackend, check_add_shape};
use crate::collection::CollectionState;
use crate::distance::similarity;
use crate::embedding::EmbeddingProvider;
use crate::types::{CollectionInfo, CollectionSpec, VectorRecord};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Payload>,
}

#[derive(Debug)]
struct MemoryCollection {
    state: CollectionState,
    records: RwLock<HashMap<String, StoredRecord>>,
}

impl MemoryCollection {
    fn new(state: CollectionState) -> Self {
        Self {
            state,
            records: RwLock::new(HashMap::new()),
        }
    }

    fn records(&self) -> Result<RwLockReadGuard<'_, HashMap<String, StoredRecord>>> {
        self.records
            .read()
            .map_err(|e| Error::operation(format!("Lock poisoned: {e}")))
    }

    fn records_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, StoredRecord>>> {
        self.records
            .write()
            .map_err(|e| Error::operation(format!("Lock poisoned: {e}")))
    }

    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredHit>> {
        let metric = self.state.metric();
        let records = self.records()?;
        let mut hits: Vec<ScoredHit> = records
            .iter()
            .filter(|(_, record)| filter.is_none_or(|f| f.matches(record.payload.as_ref())))
            .map(|(id, record)| ScoredHit {
                id: id.clone(),
                score: similarity(metric, query, &record.vector),
                payload: record.payload.clone(),
            })
            .collect();
        drop(records);

        sort_hits(&mut hits);
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// On-disk form of a [`MemoryBackend`].
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    collections: Vec<CollectionSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CollectionSnapshot {
    name: String,
    metric: SimilarityMetric,
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    records: BTreeMap<String, StoredRecord>,
}

/// The embedded engine.
///
/// Without a path it lives only as long as the process. With
/// [`MemoryBackend::open`] it reloads a snapshot and [`flush`] rewrites it.
///
/// [`flush`]: VectorIndexBackend::flush
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
    path: Option<PathBuf>,
}

impl MemoryBackend {
    /// Create an empty, unpersisted store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the snapshot at `path`, or start empty if it does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut collections = HashMap::new();

        if path.exists() {
            let json =
                std::fs::read_to_string(&path).map_err(|e| Error::io_with_path(e, &path))?;
            let snapshot: Snapshot = serde_json::from_str(&json)?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(Error::invalid_data(format!(
                    "{}: unsupported snapshot version {}",
                    path.display(),
                    snapshot.version
                )));
            }
            for entry in snapshot.collections {
                let state =
                    CollectionState::with_dimension(&entry.name, entry.metric, entry.dimension);
                let collection = MemoryCollection {
                    state,
                    records: RwLock::new(entry.records.into_iter().collect()),
                };
                collections.insert(entry.name, Arc::new(collection));
            }
            log::info!(
                "Loaded {} collection(s) from {}",
                collections.len(),
                path.display()
            );
        }

        Ok(Self {
            collections: RwLock::new(collections),
            path: Some(path),
        })
    }

    /// Snapshot file, if persistent.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the snapshot (no-op without a path).
    ///
    /// Writes to a sibling temp file first and renames it into place.
    pub fn persist(&self) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        let mut collections = Vec::new();
        for collection in self.all()? {
            let records = collection.records()?;
            collections.push(CollectionSnapshot {
                name: collection.state.name().to_string(),
                metric: collection.state.metric(),
                dimension: collection.state.dimension(),
                records: records
                    .iter()
                    .map(|(id, record)| (id.clone(), record.clone()))
                    .collect(),
            });
        }
        collections.sort_by(|a, b| a.name.cmp(&b.name));

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            collections,
        };
        let json = serde_json::to_string(&snapshot)?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(e, parent))?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| Error::io_with_path(e, &tmp))?;
        std::fs::rename(&tmp, path).map_err(|e| Error::io_with_path(e, path))?;
        log::debug!("Persisted snapshot to {}", path.display());
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Arc<MemoryCollection>>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| Error::operation(format!("Lock poisoned: {e}")))?;
        Ok(collections.get(name).cloned())
    }

    fn require(&self, name: &str) -> Result<Arc<MemoryCollection>> {
        self.get(name)?
            .ok_or_else(|| Error::collection_not_found(name))
    }

    fn all(&self) -> Result<Vec<Arc<MemoryCollection>>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| Error::operation(format!("Lock poisoned: {e}")))?;
        Ok(collections.values().cloned().collect())
    }

    fn get_or_create(&self, spec: &CollectionSpec) -> Result<Arc<MemoryCollection>> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| Error::operation(format!("Lock poisoned: {e}")))?;
        let collection = collections.entry(spec.name.clone()).or_insert_with(|| {
            log::info!("Creating collection '{}' ({})", spec.name, spec.metric);
            Arc::new(MemoryCollection::new(CollectionState::new(
                &spec.name,
                spec.metric,
            )))
        });
        if collection.state.metric() != spec.metric {
            log::warn!(
                "Collection '{}' uses {}; ignoring requested {}",
                spec.name,
                collection.state.metric(),
                spec.metric
            );
        }
        Ok(collection.clone())
    }
}

#[async_trait]
impl VectorIndexBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ensure_collection(
        &self,
        spec: &CollectionSpec,
        provider: &dyn EmbeddingProvider,
    ) -> Result<usize> {
        let collection = self.get_or_create(spec)?;
        collection.state.resolve(spec.dimension, provider).await
    }

    async fn collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>> {
        let Some(collection) = self.get(collection)? else {
            return Ok(None);
        };
        let record_count = collection.records()?.len();
        Ok(Some(CollectionInfo {
            name: collection.state.name().to_string(),
            metric: collection.state.metric(),
            dimension: collection.state.dimension(),
            record_count,
        }))
    }

    async fn add(
        &self,
        collection: &str,
        ids: &[String],
        vectors: &[Vec<f32>],
        payloads: Option<&[Payload]>,
    ) -> Result<usize> {
        check_add_shape(ids, vectors, payloads)?;
        let collection = self.require(collection)?;
        collection.state.admit(vectors).await?;

        let mut records = collection.records_mut()?;
        for (i, (id, vector)) in ids.iter().zip(vectors).enumerate() {
            records.insert(
                id.clone(),
                StoredRecord {
                    vector: vector.clone(),
                    payload: payloads.map(|p| p[i].clone()),
                },
            );
        }
        Ok(ids.len())
    }

    async fn query(
        &self,
        collection: &str,
        queries: &[Vec<f32>],
        top_k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<Vec<ScoredHit>>> {
        let Some(collection) = self.get(collection)? else {
            return Ok(vec![Vec::new(); queries.len()]);
        };
        let Some(dimension) = collection.state.dimension() else {
            return Ok(vec![Vec::new(); queries.len()]);
        };
        collection.state.check(dimension, queries)?;

        queries
            .iter()
            .map(|q| collection.search(q, top_k, filter))
            .collect()
    }

    async fn fetch(&self, collection: &str, ids: &[String]) -> Result<Vec<VectorRecord>> {
        let collection = self.require(collection)?;
        let records = collection.records()?;
        Ok(ids
            .iter()
            .filter_map(|id| {
                records.get(id).map(|r| VectorRecord {
                    id: id.clone(),
                    vector: r.vector.clone(),
                    payload: r.payload.clone(),
                })
            })
            .collect())
    }

    async fn exists(&self, collection: &str, ids: &[String]) -> Result<HashSet<String>> {
        let Some(collection) = self.get(collection)? else {
            return Ok(HashSet::new());
        };
        let records = collection.records()?;
        Ok(ids
            .iter()
            .filter(|id| records.contains_key(id.as_str()))
            .cloned()
            .collect())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        let collection = self.require(collection)?;
        let mut records = collection.records_mut()?;
        for id in ids {
            records.remove(id);
        }
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| Error::operation(format!("Lock poisoned: {e}")))?;
        if collections.remove(collection).is_some() {
            log::info!("Deleted collection '{collection}'");
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.persist()
    }
}

// ============================================================================
// Tests
// ============================================================================
