//! Remote Chroma collection over its v2 REST API.
//!
//! The collection id is resolved with `get_or_create` on first use and
//! memoized. MMR is applied client-side over `fetch_k` candidates returned
//! with their embeddings.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use sieve_core::config::ServerSettings;
use sieve_core::types::metadata_from_json;
use sieve_core::{Document, DocumentId, Embedder, Error, Metadata, Result, SearchMode, VectorStore};

use crate::mmr::{mmr_select, MmrParams};
use crate::{assign_missing_ids, backend_err, require_embedder};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ChromaStore {
    api_root: String,
    collection: String,
    embedder: Option<Arc<dyn Embedder>>,
    mmr: MmrParams,
    client: reqwest::Client,
    collection_id: OnceCell<String>,
}

#[derive(Deserialize)]
struct CollectionInfo {
    id: String,
}

/// Column-oriented `get` response.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct GetResponse {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<serde_json::Map<String, Value>>>>,
}

/// Like `GetResponse`, but every column is nested once per query embedding.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<serde_json::Map<String, Value>>>>>,
    #[serde(default)]
    embeddings: Option<Vec<Vec<Vec<f32>>>>,
}

fn to_document(id: &str, content: Option<&String>, meta: Option<&serde_json::Map<String, Value>>) -> Document {
    Document {
        id: Some(id.to_string()),
        sequence_index: None,
        content: content.cloned().unwrap_or_default(),
        metadata: meta.map(metadata_from_json).unwrap_or_default(),
    }
}

impl GetResponse {
    pub(crate) fn into_documents(self) -> Vec<Document> {
        let docs = self.documents.unwrap_or_default();
        let metas = self.metadatas.unwrap_or_default();
        self.ids
            .iter()
            .enumerate()
            .map(|(i, id)| to_document(id, docs.get(i).and_then(Option::as_ref), metas.get(i).and_then(Option::as_ref)))
            .collect()
    }
}

impl QueryResponse {
    /// Hits for the first (only) query embedding, with their vectors when returned.
    pub(crate) fn into_hits(self) -> Vec<(Document, Vec<f32>)> {
        let ids = self.ids.into_iter().next().unwrap_or_default();
        let docs = self.documents.and_then(|d| d.into_iter().next()).unwrap_or_default();
        let metas = self.metadatas.and_then(|m| m.into_iter().next()).unwrap_or_default();
        let vectors = self.embeddings.and_then(|e| e.into_iter().next()).unwrap_or_default();
        ids.iter()
            .enumerate()
            .map(|(i, id)| {
                let doc = to_document(id, docs.get(i).and_then(Option::as_ref), metas.get(i).and_then(Option::as_ref));
                (doc, vectors.get(i).cloned().unwrap_or_default())
            })
            .collect()
    }
}

/// Chroma rejects empty metadata objects, so those are sent as null.
fn metadata_json(meta: &Metadata) -> Value {
    if meta.is_empty() {
        return Value::Null;
    }
    Value::Object(meta.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}

impl ChromaStore {
    pub fn new(
        server: &ServerSettings,
        collection: &str,
        embedder: Option<Arc<dyn Embedder>>,
        mmr: MmrParams,
    ) -> Result<Self> {
        if server.host.trim().is_empty() {
            return Err(Error::InvalidConfig("store.server.host must not be empty".into()));
        }
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build().map_err(backend_err)?;
        Ok(Self {
            api_root: server.database_url(),
            collection: collection.to_string(),
            embedder,
            mmr,
            client,
            collection_id: OnceCell::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_root, path)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<String> {
        let url = self.url(path);
        let response = self.client.post(&url).json(body).send().await.map_err(backend_err)?;
        let status = response.status();
        let text = response.text().await.map_err(backend_err)?;
        if !status.is_success() {
            return Err(Error::Backend(format!("chroma {path}: {status}: {text}")));
        }
        Ok(text)
    }

    async fn collection_id(&self) -> Result<&str> {
        let id = self
            .collection_id
            .get_or_try_init(|| async {
                let body = json!({ "name": self.collection, "get_or_create": true });
                let text = self.post("/collections", &body).await?;
                let info: CollectionInfo = serde_json::from_str(&text)?;
                tracing::info!(
                    collection = %self.collection,
                    id = %info.id,
                    url = %self.api_root,
                    "opened chroma collection"
                );
                Ok::<_, Error>(info.id)
            })
            .await?;
        Ok(id.as_str())
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    fn collection_name(&self) -> &str {
        &self.collection
    }

    async fn add(&self, documents: &[Document]) -> Result<Vec<DocumentId>> {
        let embedder = require_embedder(self.embedder.as_ref())?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let docs = assign_missing_ids(documents);
        let texts: Vec<String> = docs.iter().map(|d| d.content.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;
        let ids: Vec<DocumentId> = docs.iter().filter_map(|d| d.id.clone()).collect();
        let metadatas: Vec<Value> = docs.iter().map(|d| metadata_json(&d.metadata)).collect();

        let cid = self.collection_id().await?;
        let body = json!({ "ids": ids, "embeddings": embeddings, "documents": texts, "metadatas": metadatas });
        self.post(&format!("/collections/{cid}/add"), &body).await?;
        tracing::info!(collection = %self.collection, added = ids.len(), "chroma add");
        Ok(ids)
    }

    async fn list(&self, limit: Option<usize>) -> Result<Vec<Document>> {
        let cid = self.collection_id().await?;
        let mut body = json!({ "include": ["documents", "metadatas"] });
        if let Some(n) = limit {
            body["limit"] = json!(n);
        }
        let text = self.post(&format!("/collections/{cid}/get"), &body).await?;
        let parsed: GetResponse = serde_json::from_str(&text)?;
        Ok(parsed.into_documents())
    }

    async fn similarity_search(&self, query: &str, mode: SearchMode, k: usize) -> Result<Vec<Document>> {
        let embedder = require_embedder(self.embedder.as_ref())?;
        let q = embedder.embed_query(query).await?;
        let cid = self.collection_id().await?;
        let n_results = match mode {
            SearchMode::Similarity => k,
            SearchMode::Mmr => self.mmr.fetch_k.max(k),
        };
        let mut include = vec!["documents", "metadatas", "distances"];
        if mode == SearchMode::Mmr {
            include.push("embeddings");
        }
        let body = json!({ "query_embeddings": [q], "n_results": n_results, "include": include });
        let text = self.post(&format!("/collections/{cid}/query"), &body).await?;
        let hits = serde_json::from_str::<QueryResponse>(&text)?.into_hits();
        tracing::debug!(collection = %self.collection, hits = hits.len(), ?mode, "chroma query");

        match mode {
            SearchMode::Similarity => Ok(hits.into_iter().take(k).map(|(d, _)| d).collect()),
            SearchMode::Mmr => {
                let vectors: Vec<Vec<f32>> = hits.iter().map(|(_, v)| v.clone()).collect();
                let order = mmr_select(&q, &vectors, k, self.mmr.lambda);
                Ok(order.into_iter().map(|i| hits[i].0.clone()).collect())
            }
        }
    }
}
