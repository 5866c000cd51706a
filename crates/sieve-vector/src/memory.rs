//! Ephemeral store: lives for the process, scores by brute-force cosine.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use sieve_core::{Document, DocumentId, Embedder, Error, Result, SearchMode, VectorStore};

use crate::mmr::{cosine, mmr_select, MmrParams};
use crate::{assign_missing_ids, require_embedder};

struct Entry {
    doc: Document,
    vector: Vec<f32>,
}

pub struct InMemoryStore {
    collection: String,
    embedder: Option<Arc<dyn Embedder>>,
    mmr: MmrParams,
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryStore {
    pub fn new(collection: impl Into<String>, embedder: Option<Arc<dyn Embedder>>, mmr: MmrParams) -> Self {
        Self { collection: collection.into(), embedder, mmr, entries: RwLock::new(Vec::new()) }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
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
        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != docs.len() {
            return Err(Error::Embedding(format!("got {} vectors for {} documents", vectors.len(), docs.len())));
        }

        let mut ids = Vec::with_capacity(docs.len());
        let mut entries = self.entries.write().await;
        for (doc, vector) in docs.into_iter().zip(vectors) {
            if let Some(id) = &doc.id {
                ids.push(id.clone());
            }
            entries.push(Entry { doc, vector });
        }
        tracing::debug!(collection = %self.collection, added = ids.len(), total = entries.len(), "in-memory add");
        Ok(ids)
    }

    async fn list(&self, limit: Option<usize>) -> Result<Vec<Document>> {
        let entries = self.entries.read().await;
        let take = limit.unwrap_or(entries.len());
        Ok(entries.iter().take(take).map(|e| e.doc.clone()).collect())
    }

    async fn similarity_search(&self, query: &str, mode: SearchMode, k: usize) -> Result<Vec<Document>> {
        let embedder = require_embedder(self.embedder.as_ref())?;
        let q = embedder.embed_query(query).await?;
        let entries = self.entries.read().await;

        let mut scored: Vec<(usize, f32)> =
            entries.iter().enumerate().map(|(i, e)| (i, cosine(&q, &e.vector))).collect();
        // stable sort: equal scores keep insertion order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let picked: Vec<usize> = match mode {
            SearchMode::Similarity => scored.into_iter().take(k).map(|(i, _)| i).collect(),
            SearchMode::Mmr => {
                let pool: Vec<usize> = scored.into_iter().take(self.mmr.fetch_k.max(k)).map(|(i, _)| i).collect();
                let vectors: Vec<Vec<f32>> = pool.iter().map(|&i| entries[i].vector.clone()).collect();
                mmr_select(&q, &vectors, k, self.mmr.lambda).into_iter().map(|p| pool[p]).collect()
            }
        };
        Ok(picked.into_iter().map(|i| entries[i].doc.clone()).collect())
    }
}
