use std::sync::Arc;

use sieve_core::config::{SearchSettings, StoreSettings};
use sieve_core::{Document, Embedder, Error, SearchMode, VectorStore};
use sieve_embed::HashingEmbedder;
use sieve_vector::{open_store, InMemoryStore, LanceStore, MmrParams};

fn embedder() -> Arc<dyn Embedder> {
    Arc::new(HashingEmbedder::new(128))
}

fn corpus() -> Vec<Document> {
    vec![
        Document::new("pricing for the basic plan").with_meta("source", "pricing.md"),
        Document::new("the weather is sunny today"),
        Document::new("enterprise pricing is negotiated").with_meta("page", 2i64),
        Document::new("cats sleep most of the day"),
    ]
}

#[tokio::test]
async fn memory_store_ranks_by_similarity() {
    let store = InMemoryStore::new("docs", Some(embedder()), MmrParams::default());
    let ids = store.add(&corpus()).await.expect("add");
    assert_eq!(ids.len(), 4);
    assert_eq!(store.len().await, 4);

    let hits = store.similarity_search("pricing", SearchMode::Similarity, 2).await.expect("search");
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|d| d.content.contains("pricing")), "both pricing docs rank first: {hits:?}");
    assert!(hits.iter().all(|d| d.id.is_some()), "stored documents carry ids");
}

#[tokio::test]
async fn memory_store_list_respects_limit_and_order() {
    let store = InMemoryStore::new("docs", Some(embedder()), MmrParams::default());
    store.add(&corpus()).await.expect("add");
    let listed = store.list(Some(2)).await.expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].content, "pricing for the basic plan");
    assert_eq!(store.list(None).await.expect("list").len(), 4);
}

#[tokio::test]
async fn mmr_returns_k_distinct_documents() {
    let store = InMemoryStore::new("docs", Some(embedder()), MmrParams { fetch_k: 4, lambda: 0.5 });
    store.add(&corpus()).await.expect("add");
    let hits = store.similarity_search("pricing plan", SearchMode::Mmr, 3).await.expect("mmr");
    assert_eq!(hits.len(), 3);
    let mut ids: Vec<_> = hits.iter().filter_map(|d| d.id.clone()).collect();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert!(hits[0].content.contains("pricing"));
}

#[tokio::test]
async fn store_without_embedder_reports_missing_capability() {
    let store = InMemoryStore::new("docs", None, MmrParams::default());
    let err = store.add(&corpus()).await.expect_err("no embedder");
    assert!(matches!(err, Error::MissingCapability("embedding")));
    assert!(err.is_configuration());
    assert!(store.list(None).await.expect("list").is_empty());
}

#[tokio::test]
async fn lance_store_persists_across_handles() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let uri = tmp.path().to_string_lossy().to_string();

    let store = LanceStore::open(&uri, "docs", Some(embedder()), MmrParams::default()).await?;
    assert!(store.list(None).await?.is_empty(), "no table yet means no documents");
    store.add(&corpus()).await?;

    let reopened = LanceStore::open(&uri, "docs", Some(embedder()), MmrParams::default()).await?;
    let listed = reopened.list(None).await?;
    assert_eq!(listed.len(), 4);
    let pricing = listed.iter().find(|d| d.content == "pricing for the basic plan").expect("doc");
    assert_eq!(pricing.metadata.get("source").map(ToString::to_string).as_deref(), Some("pricing.md"));

    let hits = reopened.similarity_search("enterprise pricing", SearchMode::Similarity, 1).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "enterprise pricing is negotiated");
    Ok(())
}

#[tokio::test]
async fn open_store_defaults_to_memory() {
    let store = open_store(&StoreSettings::default(), &SearchSettings::default(), Some(embedder()))
        .await
        .expect("store");
    assert_eq!(store.collection_name(), "sieve");
    store.add(&corpus()).await.expect("add");
    assert_eq!(store.list(None).await.expect("list").len(), 4);
}
