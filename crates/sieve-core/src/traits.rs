use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Document, DocumentId, SearchMode};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hashing:d384`).
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| crate::error::Error::Embedding("embedder returned no vector".into()))
    }
}

/// Similarity-search backend consumed as an opaque capability.
///
/// Implementations do no caching or filtering. The first call lazily
/// opens or creates the backing collection.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn collection_name(&self) -> &str;

    /// Writes documents, returning the ids the backend stored them under.
    async fn add(&self, documents: &[Document]) -> Result<Vec<DocumentId>>;

    /// Stored documents in backend order; `None` means unbounded.
    async fn list(&self, limit: Option<usize>) -> Result<Vec<Document>>;

    /// Up to `k` documents ordered by descending relevance.
    async fn similarity_search(&self, query: &str, mode: SearchMode, k: usize) -> Result<Vec<Document>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelReply {
    pub content: String,
}

impl ModelReply {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into() }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<ModelReply>;
}
