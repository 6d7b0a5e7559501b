//! Qdrant adapter over the REST API.
//!
//! Serves both a self-hosted server and Qdrant Cloud (the latter sends an
//! `api-key` header). Qdrant only accepts integers or UUIDs as point ids, so
//! caller ids are mapped to deterministic UUIDv5s and kept in the payload
//! under [`ORIGINAL_ID_KEY`]; that key is stripped again on the way out.

use async_trait::async_trait;
use quiver_core::{
    Error, Payload, PayloadFilter, Result, ScoredHit, SimilarityMetric, sort_hits,
};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::backend::{VectorIndexBackend, check_add_shape};
use crate::collection::CollectionState;
use crate::distance::euclidean_to_similarity;
use crate::embedding::EmbeddingProvider;
use crate::types::{CollectionInfo, CollectionSpec, VectorRecord};

/// Payload key holding the caller's id.
pub const ORIGINAL_ID_KEY: &str = "original_id";

/// Namespace for caller-id → point-id mapping. Changing it orphans every
/// existing point.
const POINT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_123456789abc);

/// Networked adapter for Qdrant.
pub struct QdrantBackend {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    collections: RwLock<HashMap<String, Arc<CollectionState>>>,
}

/// Remote view of a collection.
#[derive(Debug, Clone, PartialEq)]
struct RemoteCollection {
    metric: SimilarityMetric,
    dimension: usize,
    points: usize,
}

impl QdrantBackend {
    /// Point the adapter at `base_url` (e.g. `http://localhost:6333`).
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::config(format!(
                "Qdrant URL must start with http:// or https://, got '{base_url}'"
            )));
        }
        Ok(Self {
            base_url,
            api_key: None,
            client: reqwest::Client::new(),
            collections: RwLock::new(HashMap::new()),
        })
    }

    /// Authenticate every request with a cloud API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        collection: &str,
        body: Option<Value>,
    ) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.request(method, &url);
        if let Some(ref key) = self.api_key {
            request = request.header("api-key", key);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::backend_unavailable(format!("Qdrant request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_status(status, collection, &error_text));
        }

        response
            .json()
            .await
            .map_err(|e| Error::backend_unavailable(format!("Failed to parse Qdrant response: {e}")))
    }

    async fn remote_collection(&self, name: &str) -> Result<Option<RemoteCollection>> {
        match self
            .call(Method::GET, &format!("/collections/{name}"), name, None)
            .await
        {
            Ok(body) => parse_collection(&body).map(Some),
            Err(e) if e.is_collection_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_remote(&self, name: &str, metric: SimilarityMetric, dimension: usize) -> Result<()> {
        let body = json!({
            "vectors": { "size": dimension, "distance": distance_name(metric) },
        });
        self.call(Method::PUT, &format!("/collections/{name}"), name, Some(body))
            .await?;
        log::info!("Created Qdrant collection '{name}' ({metric}, dimension {dimension})");
        Ok(())
    }

    fn cached(&self, name: &str) -> Result<Option<Arc<CollectionState>>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| Error::operation(format!("Lock poisoned: {e}")))?;
        Ok(collections.get(name).cloned())
    }

    fn cache(&self, state: CollectionState) -> Result<Arc<CollectionState>> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| Error::operation(format!("Lock poisoned: {e}")))?;
        Ok(collections
            .entry(state.name().to_string())
            .or_insert_with(|| Arc::new(state))
            .clone())
    }

    /// Local state for a collection, learning it from the server if needed.
    async fn state(&self, name: &str) -> Result<Option<Arc<CollectionState>>> {
        if let Some(state) = self.cached(name)?
            && state.dimension().is_some()
        {
            return Ok(Some(state));
        }
        match self.remote_collection(name).await? {
            Some(remote) => {
                let state = self.cache(CollectionState::new(name, remote.metric))?;
                state
                    .init_with(|| async { Ok::<usize, Error>(remote.dimension) })
                    .await?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    fn forget(&self, name: &str) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| Error::operation(format!("Lock poisoned: {e}")))?;
        collections.remove(name);
        Ok(())
    }
}

#[async_trait]
impl VectorIndexBackend for QdrantBackend {
    fn name(&self) -> &str {
        "qdrant"
    }

    async fn ensure_collection(
        &self,
        spec: &CollectionSpec,
        provider: &dyn EmbeddingProvider,
    ) -> Result<usize> {
        let state = match self.cached(&spec.name)? {
            Some(state) => state,
            None => self.cache(CollectionState::new(&spec.name, spec.metric))?,
        };

        let dimension = state
            .init_with(|| async {
                if let Some(remote) = self.remote_collection(&spec.name).await? {
                    log::info!(
                        "Adopting existing Qdrant collection '{}' (dimension {})",
                        spec.name,
                        remote.dimension
                    );
                    return Ok(remote.dimension);
                }
                let dimension = state.pick_dimension(spec.dimension, provider).await?;
                self.create_remote(&spec.name, spec.metric, dimension).await?;
                Ok::<usize, Error>(dimension)
            })
            .await?;
        state.warn_on_conflict(spec.dimension, dimension);
        Ok(dimension)
    }

    async fn collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>> {
        Ok(self
            .remote_collection(collection)
            .await?
            .map(|remote| CollectionInfo {
                name: collection.to_string(),
                metric: remote.metric,
                dimension: Some(remote.dimension),
                record_count: remote.points,
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
        let state = self
            .state(collection)
            .await?
            .ok_or_else(|| Error::collection_not_found(collection))?;
        state.admit(vectors).await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let points: Vec<Value> = ids
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (id, vector))| {
                let mut payload = payloads.map(|p| p[i].clone()).unwrap_or_default();
                payload.insert(ORIGINAL_ID_KEY.to_string(), Value::String(id.clone()));
                json!({ "id": point_id(id), "vector": vector, "payload": payload })
            })
            .collect();

        self.call(
            Method::PUT,
            &format!("/collections/{collection}/points?wait=true"),
            collection,
            Some(json!({ "points": points })),
        )
        .await?;
        Ok(ids.len())
    }

    async fn query(
        &self,
        collection: &str,
        queries: &[Vec<f32>],
        top_k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<Vec<ScoredHit>>> {
        let Some(state) = self.state(collection).await? else {
            return Ok(vec![Vec::new(); queries.len()]);
        };
        if queries.is_empty() || top_k == 0 {
            return Ok(vec![Vec::new(); queries.len()]);
        }
        if let Some(dimension) = state.dimension() {
            state.check(dimension, queries)?;
        }

        let searches: Vec<Value> = queries
            .iter()
            .map(|vector| {
                let mut search = json!({
                    "vector": vector,
                    "limit": top_k,
                    "with_payload": true,
                });
                if let Some(filter) = filter.filter(|f| !f.is_empty()) {
                    search["filter"] = to_qdrant_filter(filter);
                }
                search
            })
            .collect();

        let body = self
            .call(
                Method::POST,
                &format!("/collections/{collection}/points/search/batch"),
                collection,
                Some(json!({ "searches": searches })),
            )
            .await?;

        let batches = body["result"]
            .as_array()
            .ok_or_else(|| Error::invalid_data("Qdrant search response has no result array"))?;
        batches
            .iter()
            .map(|batch| {
                let mut hits = batch
                    .as_array()
                    .map(|points| {
                        points
                            .iter()
                            .map(|p| scored_hit(p, state.metric()))
                            .collect::<Result<Vec<_>>>()
                    })
                    .transpose()?
                    .unwrap_or_default();
                sort_hits(&mut hits);
                Ok(hits)
            })
            .collect()
    }

    async fn fetch(&self, collection: &str, ids: &[String]) -> Result<Vec<VectorRecord>> {
        if self.state(collection).await?.is_none() {
            return Err(Error::collection_not_found(collection));
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let point_ids: Vec<String> = ids.iter().map(|id| point_id(id)).collect();
        let body = self
            .call(
                Method::POST,
                &format!("/collections/{collection}/points"),
                collection,
                Some(json!({ "ids": point_ids, "with_payload": true, "with_vector": true })),
            )
            .await?;

        let mut by_id: HashMap<String, VectorRecord> = body["result"]
            .as_array()
            .map(|points| points.iter().map(stored_record).collect::<Result<Vec<_>>>())
            .transpose()?
            .unwrap_or_default()
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn exists(&self, collection: &str, ids: &[String]) -> Result<HashSet<String>> {
        match self.fetch(collection, ids).await {
            Ok(records) => Ok(records.into_iter().map(|r| r.id).collect()),
            Err(e) if e.is_collection_not_found() => Ok(HashSet::new()),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        if self.state(collection).await?.is_none() {
            return Err(Error::collection_not_found(collection));
        }
        if ids.is_empty() {
            return Ok(());
        }
        let point_ids: Vec<String> = ids.iter().map(|id| point_id(id)).collect();
        self.call(
            Method::POST,
            &format!("/collections/{collection}/points/delete?wait=true"),
            collection,
            Some(json!({ "points": point_ids })),
        )
        .await?;
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.forget(collection)?;
        match self
            .call(
                Method::DELETE,
                &format!("/collections/{collection}"),
                collection,
                None,
            )
            .await
        {
            Ok(_) => {
                log::info!("Deleted Qdrant collection '{collection}'");
                Ok(())
            }
            Err(e) if e.is_collection_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for QdrantBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantBackend")
            .field("base_url", &self.base_url)
            .field("cloud", &self.api_key.is_some())
            .finish()
    }
}

// ============================================================================
// Wire helpers
// ============================================================================

/// Deterministic UUIDv5 point id for a caller id.
pub fn point_id(id: &str) -> String {
    Uuid::new_v5(&POINT_ID_NAMESPACE, id.as_bytes()).to_string()
}

fn distance_name(metric: SimilarityMetric) -> &'static str {
    match metric {
        SimilarityMetric::Cosine => "Cosine",
        SimilarityMetric::Euclidean => "Euclid",
        SimilarityMetric::InnerProduct => "Dot",
    }
}

fn parse_distance(name: &str) -> Result<SimilarityMetric> {
    match name {
        "Cosine" => Ok(SimilarityMetric::Cosine),
        "Euclid" => Ok(SimilarityMetric::Euclidean),
        "Dot" => Ok(SimilarityMetric::InnerProduct),
        other => Err(Error::invalid_data(format!(
            "Unsupported Qdrant distance '{other}'"
        ))),
    }
}

fn classify_status(status: StatusCode, collection: &str, body: &str) -> Error {
    if status == StatusCode::NOT_FOUND {
        Error::collection_not_found(collection)
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Error::backend_unavailable(format!("Qdrant error {status}: {body}"))
    } else {
        Error::invalid_data(format!("Qdrant rejected request ({status}): {body}"))
    }
}

fn parse_collection(body: &Value) -> Result<RemoteCollection> {
    let result = &body["result"];
    let vectors = &result["config"]["params"]["vectors"];
    let dimension = vectors["size"]
        .as_u64()
        .ok_or_else(|| Error::invalid_data("Qdrant collection has no single vector size"))?;
    let metric = parse_distance(vectors["distance"].as_str().unwrap_or_default())?;
    Ok(RemoteCollection {
        metric,
        dimension: dimension as usize,
        points: result["points_count"].as_u64().unwrap_or(0) as usize,
    })
}

fn to_qdrant_filter(filter: &PayloadFilter) -> Value {
    let must: Vec<Value> = filter
        .must
        .iter()
        .map(|(key, value)| json!({ "key": key, "match": { "value": value } }))
        .collect();
    json!({ "must": must })
}

/// Split a returned point into caller id and cleaned payload.
fn split_point(point: &Value) -> (String, Option<Payload>) {
    let mut payload = point["payload"].as_object().cloned();
    let original = payload
        .as_mut()
        .and_then(|p| p.remove(ORIGINAL_ID_KEY))
        .and_then(|v| v.as_str().map(str::to_string));
    let id = original.unwrap_or_else(|| match &point["id"] {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });
    (id, payload)
}

fn scored_hit(point: &Value, metric: SimilarityMetric) -> Result<ScoredHit> {
    let raw = point["score"]
        .as_f64()
        .ok_or_else(|| Error::invalid_data("Qdrant hit has no score"))? as f32;
    let score = match metric {
        SimilarityMetric::Euclidean => euclidean_to_similarity(raw),
        _ => raw,
    };
    let (id, payload) = split_point(point);
    Ok(ScoredHit { id, score, payload })
}

fn stored_record(point: &Value) -> Result<VectorRecord> {
    let vector = point["vector"]
        .as_array()
        .ok_or_else(|| Error::invalid_data("Qdrant point has no vector"))?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| Error::invalid_data("Qdrant vector contains a non-number"))?;
    let (id, payload) = split_point(point);
    Ok(VectorRecord {
        id,
        vector,
        payload,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_deterministic_uuid() {
        let a = point_id("doc-1");
        assert_eq!(a, point_id("doc-1"));
        assert_ne!(a, point_id("doc-2"));
        assert!(Uuid::parse_str(&a).is_ok());
        assert_eq!(Uuid::parse_str(&a).unwrap().get_version_num(), 5);
    }

    #[test]
    fn test_new_rejects_bad_url() {
        assert!(QdrantBackend::new("localhost:6333").is_err());
        let backend = QdrantBackend::new("http://localhost:6333/").unwrap();
        assert_eq!(backend.base_url, "http://localhost:6333");
    }

    #[test]
    fn test_distance_names_round_trip() {
        for metric in [
            SimilarityMetric::Cosine,
            SimilarityMetric::Euclidean,
            SimilarityMetric::InnerProduct,
        ] {
            assert_eq!(parse_distance(distance_name(metric)).unwrap(), metric);
        }
        assert!(parse_distance("Manhattan").is_err());
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::NOT_FOUND, "docs", "").is_collection_not_found());
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "docs", "").is_retryable());
        assert!(!classify_status(StatusCode::BAD_REQUEST, "docs", "").is_retryable());
    }

    #[test]
    fn test_parse_collection() {
        let body = json!({
            "result": {
                "status": "green",
                "points_count": 42,
                "config": { "params": { "vectors": { "size": 1536, "distance": "Dot" } } }
            },
            "status": "ok"
        });
        let remote = parse_collection(&body).unwrap();
        assert_eq!(
            remote,
            RemoteCollection {
                metric: SimilarityMetric::InnerProduct,
                dimension: 1536,
                points: 42
            }
        );
    }

    #[test]
    fn test_to_qdrant_filter() {
        let filter = PayloadFilter::new().with("lang", "en");
        assert_eq!(
            to_qdrant_filter(&filter),
            json!({ "must": [ { "key": "lang", "match": { "value": "en" } } ] })
        );
    }

    #[test]
    fn test_scored_hit_strips_original_id() {
        let point = json!({
            "id": point_id("doc-1"),
            "score": 0.8,
            "payload": { "original_id": "doc-1", "text": "hello" }
        });
        let hit = scored_hit(&point, SimilarityMetric::Cosine).unwrap();
        assert_eq!(hit.id, "doc-1");
        assert!((hit.score - 0.8).abs() < 1e-6);
        let payload = hit.payload.unwrap();
        assert!(!payload.contains_key(ORIGINAL_ID_KEY));
        assert_eq!(payload["text"], "hello");
    }

    #[test]
    fn test_scored_hit_euclidean_converts_distance() {
        let point = json!({ "id": 7, "score": 1.0 });
        let hit = scored_hit(&point, SimilarityMetric::Euclidean).unwrap();
        assert_eq!(hit.id, "7");
        assert!((hit.score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_stored_record() {
        let point = json!({
            "id": point_id("a"),
            "vector": [0.5, 0.25],
            "payload": { "original_id": "a" }
        });
        let record = stored_record(&point).unwrap();
        assert_eq!(record.id, "a");
        assert_eq!(record.vector, vec![0.5, 0.25]);
        assert!(record.payload.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_backend_unavailable() {
        // Port 9 (discard) is not expected to host Qdrant.
        let backend = QdrantBackend::new("http://127.0.0.1:9").unwrap();
        let err = backend.collection_info("docs").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    #[ignore = "requires a Qdrant server on localhost:6333"]
    async fn test_qdrant_live_round_trip() {
        use crate::embedding::MockEmbeddingProvider;

        let backend = QdrantBackend::new("http://localhost:6333").unwrap();
        let provider = MockEmbeddingProvider::new(4);
        let spec = CollectionSpec::new("quiver_live_test");
        backend.delete_collection(&spec.name).await.unwrap();

        assert_eq!(backend.ensure_collection(&spec, &provider).await.unwrap(), 4);
        let ids = vec!["a".to_string()];
        backend
            .add(&spec.name, &ids, &[vec![1.0, 0.0, 0.0, 0.0]], None)
            .await
            .unwrap();
        let hits = backend
            .query(&spec.name, &[vec![1.0, 0.0, 0.0, 0.0]], 1, None)
            .await
            .unwrap();
        assert_eq!(hits[0][0].id, "a");
        backend.delete_collection(&spec.name).await.unwrap();
    }
}
