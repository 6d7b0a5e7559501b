//! Labelled query sets.

use quiver_core::{Error, Result, parse_json_records};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One query and the ids that should be retrieved for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCase {
    /// Query text.
    pub query: String,

    /// Ground-truth relevant document ids.
    ///
    /// Read from a flat list or from a list of groups such as
    /// `"retrieval_gt": [["doc1", "doc3"]]`, which is flattened in order
    /// with repeated ids dropped.
    #[serde(
        alias = "relevantIds",
        alias = "retrieval_gt",
        deserialize_with = "flat_or_grouped_ids"
    )]
    pub relevant_ids: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdEntry {
    One(String),
    Group(Vec<String>),
}

fn flat_or_grouped_ids<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Vec::<IdEntry>::deserialize(deserializer)?;
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for entry in entries {
        let group = match entry {
            IdEntry::One(id) => vec![id],
            IdEntry::Group(group) => group,
        };
        for id in group {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
    }
    Ok(ids)
}

impl QueryCase {
    /// Create a case.
    pub fn new<I, S>(query: impl Into<String>, relevant_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            query: query.into(),
            relevant_ids: relevant_ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Relevant ids as a set.
    pub fn relevant_set(&self) -> HashSet<String> {
        self.relevant_ids.iter().cloned().collect()
    }
}

/// Parse a query set from a JSON array or from JSON Lines.
pub fn parse_query_set(content: &str) -> Result<Vec<QueryCase>> {
    parse_json_records(content, "Query set")
}

/// Load a query set file (JSON array or JSONL).
pub fn load_query_set(path: &Path) -> Result<Vec<QueryCase>> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
    let cases = parse_query_set(&content)?;
    log::debug!("Loaded {} queries from {}", cases.len(), path.display());
    Ok(cases)
}
