//! Enriched result sets and the per-component cache that holds the last one.

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use sieve_core::config::CachePolicy;
use sieve_core::Document;

/// One flattened result: `id`, `_index`, `text` and every metadata key.
pub type Row = Map<String, Value>;

const RESERVED_COLUMNS: [&str; 3] = ["id", "_index", "text"];

/// Ordered output of one search. `sequence_index` of the i-th document is i.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultSet {
    documents: Vec<Document>,
}

impl ResultSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Gives every document lacking an id a fresh v4 UUID and numbers the
    /// documents 0..N in their current order.
    pub fn enrich(raw: Vec<Document>) -> Self {
        let documents = raw
            .into_iter()
            .enumerate()
            .map(|(index, mut doc)| {
                if doc.id.as_deref().map_or(true, str::is_empty) {
                    doc.id = Some(uuid::Uuid::new_v4().to_string());
                }
                doc.sequence_index = Some(index);
                doc
            })
            .collect();
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.documents.iter()
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }

    pub fn as_rows(&self) -> Vec<Row> {
        self.documents.iter().map(to_row).collect()
    }

    /// Reserved columns first, then metadata keys in sorted order.
    pub fn columns(&self) -> Vec<String> {
        let mut meta: Vec<&String> = self
            .documents
            .iter()
            .flat_map(|d| d.metadata.keys())
            .filter(|k| !RESERVED_COLUMNS.contains(&k.as_str()))
            .collect();
        meta.sort();
        meta.dedup();
        RESERVED_COLUMNS.iter().map(|c| (*c).to_string()).chain(meta.into_iter().cloned()).collect()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}

fn to_row(doc: &Document) -> Row {
    let mut row: Row = doc.metadata.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
    row.insert("id".into(), doc.id.clone().map_or(Value::Null, Value::String));
    row.insert("_index".into(), doc.sequence_index.map_or(Value::Null, Value::from));
    row.insert("text".into(), Value::String(doc.content.clone()));
    row
}

/// Holds the result set later selections are resolved against.
pub struct ResultCache {
    policy: CachePolicy,
    slot: Mutex<Option<ResultSet>>,
}

impl ResultCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self { policy, slot: Mutex::new(None) }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Stores `results` unless a sticky cache is already populated.
    /// Returns whether the cache now holds `results`.
    pub async fn offer(&self, results: &ResultSet) -> bool {
        let mut slot = self.slot.lock().await;
        let occupied = slot.as_ref().is_some_and(|r| !r.is_empty());
        if occupied && self.policy == CachePolicy::Sticky {
            tracing::debug!("keeping the first cached result set");
            return false;
        }
        *slot = Some(results.clone());
        true
    }

    pub async fn get(&self) -> Option<ResultSet> {
        self.slot.lock().await.clone().filter(|r| !r.is_empty())
    }

    pub async fn clear(&self) {
        *self.slot.lock().await = None;
    }
}
