//! BM25 keyword index on Tantivy.
//!
//! Each document is stored with its caller id (raw, indexed for deletes),
//! its analyzed text and its metadata as a stored JSON string. Upserts
//! delete by id and re-add in the same commit, so an id is never indexed
//! twice. Every write commits and reloads the reader, so writes are visible
//! to the next search and durable when the index lives in a directory.
//!
//! Tantivy scores with BM25 (k1 = 1.2, b = 0.75).

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use quiver_core::{Error, Payload, PayloadFilter, Result, ScoredHit, sort_hits};
use serde_json::Value as JsonValue;
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, STORED, STRING, Schema, TextFieldIndexing, TextOptions, Value,
};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use crate::backend::{LexicalConfig, LexicalDocument, LexicalIndex};
use crate::tokenizer::{ANALYZER_NAME, analyzer, tokenize};

/// Indexing heap for the single writer thread.
const WRITER_HEAP_BYTES: usize = 20_000_000;

#[derive(Debug, Clone, Copy)]
struct Fields {
    id: Field,
    text: Field,
    metadata: Field,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();
    let id = builder.add_text_field("id", STRING | STORED);
    let text_options = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(ANALYZER_NAME)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    let text = builder.add_text_field("text", text_options);
    let metadata = builder.add_text_field("metadata", STORED);
    (builder.build(), Fields { id, text, metadata })
}

fn index_error(e: tantivy::TantivyError) -> Error {
    Error::operation(format!("Lexical index error: {e}"))
}

/// BM25 keyword index.
pub struct Bm25Index {
    name: String,
    path: Option<PathBuf>,
    fields: Fields,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
}

impl Bm25Index {
    /// Create an empty index held in RAM.
    pub fn in_memory(name: impl Into<String>) -> Result<Self> {
        let (schema, fields) = build_schema();
        Self::from_index(name.into(), None, Index::create_in_ram(schema), fields)
    }

    /// Open the index in directory `path`, creating it if needed.
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path).map_err(|e| Error::io_with_path(e, &path))?;

        let directory = MmapDirectory::open(&path).map_err(|e| {
            Error::operation(format!("Failed to open index directory {}: {e}", path.display()))
        })?;
        let (schema, fields) = build_schema();
        let index = Index::open_or_create(directory, schema).map_err(index_error)?;

        let index = Self::from_index(name.into(), Some(path), index, fields)?;
        if let Some(ref path) = index.path {
            log::info!(
                "Opened lexical index '{}' ({} documents) at {}",
                index.name,
                index.len(),
                path.display()
            );
        }
        Ok(index)
    }

    /// Build the index described by `config`.
    pub fn from_config(config: &LexicalConfig) -> Result<Self> {
        match config.path {
            Some(ref path) => Self::open(&config.name, path),
            None => Self::in_memory(&config.name),
        }
    }

    fn from_index(
        name: String,
        path: Option<PathBuf>,
        index: Index,
        fields: Fields,
    ) -> Result<Self> {
        index.tokenizers().register(ANALYZER_NAME, analyzer());

        let writer: IndexWriter = index
            .writer_with_num_threads(1, WRITER_HEAP_BYTES)
            .map_err(index_error)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(index_error)?;

        Ok(Self {
            name,
            path,
            fields,
            reader,
            writer: Mutex::new(writer),
        })
    }

    /// Index directory, when the index is not held in RAM.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn writer(&self) -> Result<MutexGuard<'_, IndexWriter>> {
        self.writer
            .lock()
            .map_err(|e| Error::operation(format!("Lock poisoned: {e}")))
    }

    fn id_term(&self, id: &str) -> Term {
        Term::from_field_text(self.fields.id, id)
    }

    fn to_document(&self, doc: &LexicalDocument) -> Result<TantivyDocument> {
        let mut document = TantivyDocument::default();
        document.add_text(self.fields.id, &doc.id);
        document.add_text(self.fields.text, &doc.text);
        document.add_text(self.fields.metadata, serde_json::to_string(&doc.metadata)?);
        Ok(document)
    }

    /// Commit pending operations and make them visible to searches.
    fn commit(&self, mut writer: MutexGuard<'_, IndexWriter>) -> Result<()> {
        writer.commit().map_err(index_error)?;
        drop(writer);
        self.reader.reload().map_err(index_error)
    }

    fn to_hit(&self, doc: &TantivyDocument, score: f32) -> Result<(ScoredHit, Payload)> {
        let id = text_field(doc, self.fields.id).unwrap_or_default();
        let mut payload: Payload = match text_field(doc, self.fields.metadata) {
            Some(json) => serde_json::from_str(&json)?,
            None => Payload::new(),
        };
        let metadata = payload.clone();
        if let Some(text) = text_field(doc, self.fields.text) {
            payload
                .entry("text")
                .or_insert_with(|| JsonValue::from(text));
        }
        Ok((ScoredHit::new(id, score).with_payload(payload), metadata))
    }
}

/// Get text field value from a Tantivy document.
fn text_field(doc: &TantivyDocument, field: Field) -> Option<String> {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .map(String::from)
}

impl std::fmt::Debug for Bm25Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bm25Index")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl LexicalIndex for Bm25Index {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredHit>> {
        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();
        if terms.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let num_docs = searcher.num_docs() as usize;
        if num_docs == 0 {
            return Ok(Vec::new());
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .iter()
            .map(|term| {
                let term = Term::from_field_text(self.fields.text, term);
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, query)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        // Every match is collected so that filters see all candidates and
        // ties at the cut-off still break by id.
        let candidates = searcher
            .search(&query, &TopDocs::with_limit(num_docs))
            .map_err(index_error)?;

        let mut hits: Vec<ScoredHit> = Vec::new();
        for (score, address) in candidates {
            if hits.len() >= top_k && hits.last().is_some_and(|last| score < last.score) {
                break;
            }
            let doc: TantivyDocument = searcher.doc(address).map_err(index_error)?;
            let (hit, metadata) = self.to_hit(&doc, score)?;
            if filter.is_none_or(|f| f.matches(Some(&metadata))) {
                hits.push(hit);
            }
        }

        sort_hits(&mut hits);
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn upsert(&self, documents: Vec<LexicalDocument>) -> Result<usize> {
        let count = documents.len();
        let writer = self.writer()?;
        for doc in &documents {
            writer.delete_term(self.id_term(&doc.id));
            writer
                .add_document(self.to_document(doc)?)
                .map_err(index_error)?;
        }
        self.commit(writer)?;
        log::debug!("Indexed {count} document(s) into '{}'", self.name);
        Ok(count)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let writer = self.writer()?;
        for id in ids {
            writer.delete_term(self.id_term(id));
        }
        self.commit(writer)
    }

    fn len(&self) -> usize {
        self.reader.searcher().num_docs() as usize
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    async fn corpus() -> Bm25Index {
        let index = Bm25Index::in_memory("kw").unwrap();
        index
            .upsert(vec![
                LexicalDocument::new("d0", "rust compiler borrow checker lifetimes"),
                LexicalDocument::new("d1", "python interpreter scripting asyncio")
                    .with_metadata("lang", "py"),
                LexicalDocument::new("d2", "java compiler bytecode garbage collector"),
                LexicalDocument::new("d3", "rust ownership borrowing traits generics")
                    .with_metadata("lang", "rs"),
            ])
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_search_finds_matching_docs() {
        let index = corpus().await;
        let hits = index.search("rust", 10, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"d0"));
        assert!(ids.contains(&"d3"));
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_search_matches_inflected_forms() {
        let index = corpus().await;
        // "borrowing" in d3 and "borrow" in d0 share a stem
        let hits = index.search("borrows", 10, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"d0"));
        assert!(ids.contains(&"d3"));

        let hits = index.search("What about the compilers", 10, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"d0"));
        assert!(ids.contains(&"d2"));
    }

    #[tokio::test]
    async fn test_search_empty_query_and_no_match() {
        let index = corpus().await;
        assert!(index.search("", 10, None).await.unwrap().is_empty());
        assert!(index.search("the of", 10, None).await.unwrap().is_empty());
        assert!(index.search("haskell", 10, None).await.unwrap().is_empty());
        assert!(index.search("rust", 0, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_empty_index() {
        let index = Bm25Index::in_memory("kw").unwrap();
        assert!(index.is_empty());
        assert!(index.search("rust", 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_higher_term_frequency_ranks_first() {
        let index = Bm25Index::in_memory("kw").unwrap();
        index
            .upsert(vec![
                LexicalDocument::new("low", "rust compiler"),
                LexicalDocument::new("high", "rust rust rust"),
            ])
            .await
            .unwrap();
        let hits = index.search("rust", 10, None).await.unwrap();
        assert_eq!(hits[0].id, "high");
    }

    #[tokio::test]
    async fn test_rare_terms_weigh_more() {
        let index = corpus().await;
        // "compiler" is in two docs, "lifetimes" in one
        let hits = index.search("compiler lifetimes", 10, None).await.unwrap();
        assert_eq!(hits[0].id, "d0");
    }

    #[tokio::test]
    async fn test_ties_break_by_id() {
        let index = Bm25Index::in_memory("kw").unwrap();
        index
            .upsert(vec![
                LexicalDocument::new("c", "okapi tantivy"),
                LexicalDocument::new("b", "okapi tantivy"),
                LexicalDocument::new("a", "okapi tantivy"),
            ])
            .await
            .unwrap();
        let hits = index.search("okapi", 2, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_search_truncates_to_top_k() {
        let index = corpus().await;
        let hits = index.search("rust compiler", 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_search_with_filter_and_payload() {
        let index = corpus().await;
        let filter = PayloadFilter::new().with("lang", "rs");
        let hits = index.search("rust compiler", 10, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "d3");

        let payload = hits[0].payload.as_ref().unwrap();
        assert_eq!(payload["lang"], "rs");
        assert_eq!(payload["text"], "rust ownership borrowing traits generics");
    }

    #[tokio::test]
    async fn test_filter_sees_matches_beyond_top_k() {
        let index = Bm25Index::in_memory("kw").unwrap();
        let mut docs: Vec<LexicalDocument> = (0..5)
            .map(|i| LexicalDocument::new(format!("a{i}"), "okapi okapi okapi"))
            .collect();
        docs.push(LexicalDocument::new("z", "okapi tantivy").with_metadata("keep", true));
        index.upsert(docs).await.unwrap();

        let filter = PayloadFilter::new().with("keep", true);
        let hits = index.search("okapi", 1, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "z");
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_delete_removes() {
        let index = corpus().await;
        index
            .upsert(vec![LexicalDocument::new("d0", "gardening compost")])
            .await
            .unwrap();
        assert_eq!(index.len(), 4);

        let hits = index.search("rust", 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "d3");
        assert_eq!(index.search("gardening", 10, None).await.unwrap()[0].id, "d0");

        index
            .delete(&["d3".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert!(index.search("rust", 10, None).await.unwrap().is_empty());
        assert_eq!(index.len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_ids_in_one_batch_keep_last() {
        let index = Bm25Index::in_memory("kw").unwrap();
        index
            .upsert(vec![
                LexicalDocument::new("d", "first okapi"),
                LexicalDocument::new("d", "second tantivy"),
            ])
            .await
            .unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.search("okapi", 10, None).await.unwrap().is_empty());
        assert_eq!(index.search("tantivy", 10, None).await.unwrap()[0].id, "d");
    }

    #[tokio::test]
    async fn test_directory_index_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lexical");

        {
            let index = Bm25Index::open("kw", &path).unwrap();
            index
                .upsert(vec![
                    LexicalDocument::new("d1", "reciprocal rank fusion")
                        .with_metadata("topic", json!("ranking")),
                ])
                .await
                .unwrap();
            index.flush().await.unwrap();
        }

        let mut config = LexicalConfig::new("kw");
        config.path = Some(path.to_string_lossy().into_owned());
        let reopened = Bm25Index::from_config(&config).unwrap();
        assert_eq!(reopened.path(), Some(path.as_path()));
        assert_eq!(reopened.len(), 1);
        let hits = reopened.search("fusion", 5, None).await.unwrap();
        assert_eq!(hits[0].id, "d1");
        assert_eq!(hits[0].payload.as_ref().unwrap()["topic"], "ranking");
    }

    #[test]
    fn test_debug_format() {
        let index = Bm25Index::in_memory("kw").unwrap();
        assert!(format!("{index:?}").contains("Bm25Index"));
    }
}
