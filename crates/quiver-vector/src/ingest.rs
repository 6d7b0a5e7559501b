//! Batched, parallel, retrying ingestion into a vector backend.
//!
//! Documents are split into fixed-size batches. Each batch is embedded and
//! upserted as one unit, retried with exponential backoff on transient
//! failures, and reported on its own: a batch that exhausts its retries marks
//! only its ids as failed.
//!
//! ```text
//! documents ─► chunks(batch_size) ─► buffer_unordered(parallelism)
//!                                        │
//!                         ┌──────────────┴──────────────┐
//!                         │ embed_batch ─► backend.add  │  (retry w/ backoff)
//!                         └──────────────┬──────────────┘
//!                                        ▼
//!                          IngestReport { succeeded, failed }
//! ```

use backon::{ExponentialBuilder, Retryable};
use futures::stream::{self, StreamExt};
use quiver_core::{Error, Payload, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::backend::VectorIndexBackend;
use crate::embedding::EmbeddingProvider;
use crate::payload::build_payload;
use crate::types::{BackendConfig, CollectionSpec, IngestDocument, IngestOptions, IngestReport};

/// Drives documents through an embedding provider into a backend collection.
pub struct IngestionPipeline {
    backend: Arc<dyn VectorIndexBackend>,
    provider: Arc<dyn EmbeddingProvider>,
    spec: CollectionSpec,
    options: IngestOptions,
    store_text: bool,
}

struct BatchOutcome {
    index: usize,
    ids: Vec<String>,
    result: Result<usize>,
}

impl IngestionPipeline {
    /// Create a pipeline with default tuning that stores document text.
    pub fn new(
        backend: Arc<dyn VectorIndexBackend>,
        provider: Arc<dyn EmbeddingProvider>,
        spec: CollectionSpec,
    ) -> Self {
        Self {
            backend,
            provider,
            spec,
            options: IngestOptions::default(),
            store_text: true,
        }
    }

    /// Create a pipeline from a backend definition.
    pub fn from_config(
        config: &BackendConfig,
        backend: Arc<dyn VectorIndexBackend>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self::new(backend, provider, config.collection_spec())
            .with_options(config.ingest.clone())
            .with_store_text(config.store_text)
    }

    /// Override batch, parallelism, retry and deadline tuning.
    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    /// Whether document text is copied into the payload.
    pub fn with_store_text(mut self, store_text: bool) -> Self {
        self.store_text = store_text;
        self
    }

    /// The target collection.
    pub fn collection(&self) -> &str {
        &self.spec.name
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.options.initial_backoff())
            .with_max_delay(self.options.max_backoff())
            .with_max_times(self.options.max_retries)
    }

    /// Embed and upsert `documents`, returning which ids were committed.
    ///
    /// Only invalid tuning is returned as `Err`; every runtime failure
    /// (provider, backend, deadline) lands in the report's `failed` list.
    pub async fn ingest(&self, documents: Vec<IngestDocument>) -> Result<IngestReport> {
        self.options.validate()?;
        if matches!(self.spec.dimension, Some(0)) {
            return Err(Error::config(format!(
                "collection '{}' dimension must be greater than 0",
                self.spec.name
            )));
        }

        let mut report = IngestReport::default();
        if documents.is_empty() {
            return Ok(report);
        }

        let deadline = self.options.deadline().map(|d| Instant::now() + d);
        log::info!(
            "Ingesting {} document(s) into '{}' (batch_size={}, parallelism={})",
            documents.len(),
            self.spec.name,
            self.options.batch_size,
            self.options.parallelism
        );

        if let Err(e) = self.prepare_collection().await {
            log::warn!(
                "Could not prepare collection '{}': {e}",
                self.spec.name
            );
            report.fail_all(documents.iter().map(|d| d.id.as_str()), &e.to_string());
            return Ok(report);
        }

        let batches: Vec<Vec<IngestDocument>> = documents
            .chunks(self.options.batch_size)
            .map(<[IngestDocument]>::to_vec)
            .collect();
        let total_batches = batches.len();

        let mut outcomes: Vec<BatchOutcome> = stream::iter(batches.into_iter().enumerate())
            .map(|(index, batch)| self.run_batch(index, batch, deadline))
            .buffer_unordered(self.options.parallelism)
            .collect()
            .await;
        outcomes.sort_by_key(|o| o.index);

        for outcome in outcomes {
            match outcome.result {
                Ok(_) => report.succeeded.extend(outcome.ids),
                Err(e) => report.fail_all(outcome.ids.iter().map(String::as_str), &e.to_string()),
            }
        }

        log::info!(
            "Ingested into '{}': {} succeeded, {} failed across {total_batches} batch(es)",
            self.spec.name,
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Create the collection and fix its dimension, retrying transient errors.
    async fn prepare_collection(&self) -> Result<usize> {
        (|| self.backend.ensure_collection(&self.spec, self.provider.as_ref()))
            .retry(self.backoff())
            .when(|e: &Error| e.is_retryable())
            .notify(|e: &Error, delay: Duration| {
                log::warn!(
                    "Preparing collection '{}' failed ({e}); retrying in {delay:?}",
                    self.spec.name
                );
            })
            .await
    }

    async fn run_batch(
        &self,
        index: usize,
        batch: Vec<IngestDocument>,
        deadline: Option<Instant>,
    ) -> BatchOutcome {
        let ids: Vec<String> = batch.iter().map(|d| d.id.clone()).collect();

        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::warn!(
                "Ingestion deadline passed; batch {index} ({} record(s)) not started",
                ids.len()
            );
            return BatchOutcome {
                index,
                ids,
                result: Err(Error::timeout("ingestion deadline exceeded before batch started")),
            };
        }

        let texts: Vec<&str> = batch.iter().map(|d| d.text.as_str()).collect();
        let payloads: Vec<Payload> = batch
            .iter()
            .map(|d| {
                build_payload(
                    &d.text,
                    &d.metadata,
                    self.store_text,
                    self.provider.name(),
                    &self.spec.name,
                )
            })
            .collect();

        let result = (|| self.upsert_batch(&ids, &texts, &payloads))
            .retry(self.backoff())
            .when(|e: &Error| e.is_retryable())
            .notify(|e: &Error, delay: Duration| {
                log::warn!("Batch {index} failed ({e}); retrying in {delay:?}");
            })
            .await;

        match &result {
            Ok(count) => log::debug!("Batch {index} committed {count} record(s)"),
            Err(e) => log::warn!("Batch {index} gave up: {e}"),
        }
        BatchOutcome { index, ids, result }
    }

    /// One attempt: embed the batch, then upsert it as a unit.
    async fn upsert_batch(
        &self,
        ids: &[String],
        texts: &[&str],
        payloads: &[Payload],
    ) -> Result<usize> {
        let vectors = self.provider.embed_batch(texts).await?;
        if vectors.len() != texts.len() {
            return Err(Error::embedding(format!(
                "provider returned {} embeddings for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        self.backend
            .add(&self.spec.name, ids, &vectors, Some(payloads))
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================
