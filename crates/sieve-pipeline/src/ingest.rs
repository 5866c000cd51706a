//! Duplicate-aware ingestion.
//!
//! Incoming documents are compared against up to `limit` stored documents
//! with ids stripped on both sides; only exact content and metadata matches
//! count as duplicates. Near-duplicates that differ cosmetically are written.

use sieve_core::config::IngestSettings;
use sieve_core::{Document, DocumentId, Result, VectorStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub offered: usize,
    pub skipped_duplicates: usize,
    pub added: Vec<DocumentId>,
}

/// Incoming documents with no payload-equal counterpart in `existing`,
/// in their original order.
pub fn select_new(existing: &[Document], incoming: &[Document]) -> Vec<Document> {
    let stored: Vec<Document> = existing.iter().map(Document::without_id).collect();
    incoming
        .iter()
        .filter(|doc| !stored.iter().any(|s| s.same_payload(doc)))
        .cloned()
        .collect()
}

/// Writes `incoming` to `store`, skipping stored duplicates unless they are allowed.
///
/// Without an embedding capability nothing is written and the report is empty.
pub async fn ingest_documents(
    store: &dyn VectorStore,
    incoming: &[Document],
    settings: &IngestSettings,
    embedding_available: bool,
) -> Result<IngestReport> {
    let mut report = IngestReport { offered: incoming.len(), ..IngestReport::default() };
    if incoming.is_empty() {
        return Ok(report);
    }
    if !embedding_available {
        tracing::warn!(documents = incoming.len(), "no embedding configured; skipping ingestion");
        return Ok(report);
    }

    let documents = if settings.allow_duplicates {
        incoming.to_vec()
    } else {
        let existing = store.list(settings.limit).await?;
        let fresh = select_new(&existing, incoming);
        tracing::debug!(existing = existing.len(), incoming = incoming.len(), fresh = fresh.len(), "dedup compared");
        fresh
    };
    report.skipped_duplicates = incoming.len() - documents.len();

    if documents.is_empty() {
        tracing::info!(collection = store.collection_name(), "no new documents to add");
        return Ok(report);
    }
    tracing::info!(
        collection = store.collection_name(),
        count = documents.len(),
        "adding documents to the vector store"
    );
    report.added = store.add(&documents).await?;
    Ok(report)
}
