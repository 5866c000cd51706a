//! Vector store adapters behind [`sieve_core::VectorStore`].
//!
//! Three backends share one contract: an in-process store for ephemeral
//! sessions, LanceDB for a local persist directory, and a remote Chroma
//! server. [`open_store`] picks one from configuration.

use std::fmt::Display;
use std::sync::Arc;

use sieve_core::config::{SearchSettings, StoreSettings};
use sieve_core::{Document, Embedder, Error, Result, VectorStore};

pub mod chroma;
pub mod lance;
pub mod memory;
pub mod mmr;
pub mod schema;

pub use chroma::ChromaStore;
pub use lance::LanceStore;
pub use memory::InMemoryStore;
pub use mmr::MmrParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Lance,
    Chroma,
}

impl StoreBackend {
    /// A server wins over a persist directory; neither means ephemeral.
    pub fn resolve(settings: &StoreSettings) -> Self {
        if settings.server.is_some() {
            Self::Chroma
        } else if settings.persist_directory.is_some() {
            Self::Lance
        } else {
            Self::Memory
        }
    }
}

pub async fn open_store(
    store: &StoreSettings,
    search: &SearchSettings,
    embedder: Option<Arc<dyn Embedder>>,
) -> Result<Arc<dyn VectorStore>> {
    if store.collection_name.trim().is_empty() {
        return Err(Error::InvalidConfig("store.collection_name must not be empty".into()));
    }
    let mmr = MmrParams { fetch_k: search.mmr_fetch_k, lambda: search.mmr_lambda };
    let backend = StoreBackend::resolve(store);
    tracing::info!(?backend, collection = %store.collection_name, "opening vector store");
    match (backend, &store.server, &store.persist_directory) {
        (StoreBackend::Chroma, Some(server), _) => {
            Ok(Arc::new(ChromaStore::new(server, &store.collection_name, embedder, mmr)?))
        }
        (StoreBackend::Lance, _, Some(dir)) => {
            std::fs::create_dir_all(dir)?;
            Ok(Arc::new(LanceStore::open(dir, &store.collection_name, embedder, mmr).await?))
        }
        _ => Ok(Arc::new(InMemoryStore::new(store.collection_name.clone(), embedder, mmr))),
    }
}

pub(crate) fn require_embedder(embedder: Option<&Arc<dyn Embedder>>) -> Result<&Arc<dyn Embedder>> {
    embedder.ok_or(Error::MissingCapability("embedding"))
}

/// Copies `documents`, giving a fresh v4 UUID to any that lack an id.
pub(crate) fn assign_missing_ids(documents: &[Document]) -> Vec<Document> {
    documents
        .iter()
        .map(|d| {
            let mut d = d.clone();
            d.sequence_index = None;
            if d.id.as_deref().map_or(true, str::is_empty) {
                d.id = Some(uuid::Uuid::new_v4().to_string());
            }
            d
        })
        .collect()
}

pub(crate) fn backend_err<E: Display>(e: E) -> Error {
    Error::Backend(e.to_string())
}
