use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use sieve_core::config::{FilterSettings, FilterStrategy, OutOfRangePolicy, Settings};
use sieve_core::{Document, Embedder, Error, LanguageModel, ModelReply, Result, SearchMode, VectorStore};
use sieve_embed::HashingEmbedder;
use sieve_pipeline::{
    ingest_documents, BatchedFilter, ComponentStatus, RelevanceFilter, RetrievalComponent, SelectionInput,
    SequentialFilter,
};
use sieve_vector::{InMemoryStore, MmrParams};

/// Replies from a queue, one per call; `Err` entries become model failures.
struct ScriptedModel {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(replies: Vec<std::result::Result<&str, &str>>) -> Arc<Self> {
        let replies = replies.into_iter().map(|r| r.map(str::to_string).map_err(str::to_string)).collect();
        Arc::new(Self { replies: Mutex::new(replies), prompts: Mutex::new(Vec::new()) })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn invoke(&self, prompt: &str) -> Result<ModelReply> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(content)) => Ok(ModelReply::new(content)),
            Some(Err(e)) => Err(Error::Llm(e)),
            None => Err(Error::Llm("script exhausted".into())),
        }
    }
}

/// Answers from the prompt itself, so verdicts do not depend on call order.
struct KeywordModel;

#[async_trait]
impl LanguageModel for KeywordModel {
    async fn invoke(&self, prompt: &str) -> Result<ModelReply> {
        if prompt.contains("boom") {
            return Err(Error::Llm("transport error".into()));
        }
        let reply = if prompt.contains("keep") { "relevant" } else { "irrelevant" };
        Ok(ModelReply::new(reply))
    }
}

/// A store whose search always fails at the transport layer.
struct BrokenStore;

#[async_trait]
impl VectorStore for BrokenStore {
    fn collection_name(&self) -> &str {
        "broken"
    }
    async fn add(&self, documents: &[Document]) -> Result<Vec<String>> {
        Ok(documents.iter().map(|_| "x".to_string()).collect())
    }
    async fn list(&self, _limit: Option<usize>) -> Result<Vec<Document>> {
        Ok(Vec::new())
    }
    async fn similarity_search(&self, _query: &str, _mode: SearchMode, _k: usize) -> Result<Vec<Document>> {
        Err(Error::Backend("connection refused".into()))
    }
}

fn embedder() -> Arc<dyn Embedder> {
    Arc::new(HashingEmbedder::new(256))
}

fn memory_store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new("test", Some(embedder()), MmrParams::default()))
}

fn docs(texts: &[&str]) -> Vec<Document> {
    texts.iter().map(|t| Document::new(*t)).collect()
}

fn corpus() -> Vec<Document> {
    vec![
        Document::new("pricing of the starter plan").with_meta("source", "pricing.md"),
        Document::new("pricing history of the company"),
        Document::new("enterprise pricing is negotiated per seat").with_meta("page", 3i64),
        Document::new("pricing discounts for students"),
        Document::new("office opening hours"),
    ]
}

fn contents(docs: &[Document]) -> Vec<String> {
    docs.iter().map(|d| d.content.clone()).collect()
}

#[tokio::test]
async fn dedup_makes_repeated_ingestion_idempotent() -> anyhow::Result<()> {
    let store = memory_store();
    let settings = Settings::default();
    let data = corpus();

    let first = ingest_documents(store.as_ref(), &data, &settings.ingest, true).await?;
    let second = ingest_documents(store.as_ref(), &data, &settings.ingest, true).await?;

    assert_eq!(first.added.len(), 5);
    assert!(second.added.is_empty());
    assert_eq!(second.skipped_duplicates, 5);
    assert_eq!(store.len().await, 5);
    Ok(())
}

#[tokio::test]
async fn allow_duplicates_skips_the_comparison() -> anyhow::Result<()> {
    let store = memory_store();
    let mut settings = Settings::default();
    settings.ingest.allow_duplicates = true;
    let data = docs(&["a", "b"]);
    ingest_documents(store.as_ref(), &data, &settings.ingest, true).await?;
    ingest_documents(store.as_ref(), &data, &settings.ingest, true).await?;
    assert_eq!(store.len().await, 4);
    Ok(())
}

#[tokio::test]
async fn dedup_only_sees_documents_within_limit() -> anyhow::Result<()> {
    let store = memory_store();
    let mut settings = Settings::default();
    ingest_documents(store.as_ref(), &docs(&["a", "b", "c"]), &settings.ingest, true).await?;
    settings.ingest.limit = Some(1);
    let report = ingest_documents(store.as_ref(), &docs(&["a", "c"]), &settings.ingest, true).await?;
    assert_eq!(report.added.len(), 1, "\"c\" lies beyond the limit and is written again");
    assert_eq!(store.len().await, 4);
    Ok(())
}

#[tokio::test]
async fn ingestion_without_embedding_is_a_no_op() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new("test", None, MmrParams::default()));
    let report = ingest_documents(store.as_ref(), &corpus(), &Settings::default().ingest, false).await?;
    assert!(report.added.is_empty());
    assert!(store.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn search_assigns_ids_and_positions() -> anyhow::Result<()> {
    let component = RetrievalComponent::builder(Settings::default())
        .ingest_data(corpus())
        .embedder(Some(embedder()))
        .build()?;

    let results = component.search("pricing").await?;
    assert_eq!(results.len(), 5);
    let positions: Vec<_> = results.iter().map(|d| d.sequence_index).collect();
    assert_eq!(positions, (0..5).map(Some).collect::<Vec<_>>());

    let mut ids: Vec<_> = results.iter().map(|d| d.id.clone().unwrap_or_default()).collect();
    assert!(ids.iter().all(|id| !id.is_empty()));
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 5, "ids are unique");

    // stored ids are kept, not regenerated
    let again = component.search("pricing").await?;
    let first_ids: Vec<_> = results.iter().map(|d| d.id.clone()).collect();
    let second_ids: Vec<_> = again.iter().map(|d| d.id.clone()).collect();
    assert_eq!(first_ids, second_ids);
    assert_eq!(component.status().await, ComponentStatus::Results(5));
    Ok(())
}

#[tokio::test]
async fn store_handle_is_built_once() -> anyhow::Result<()> {
    let store = memory_store();
    let component = RetrievalComponent::builder(Settings::default())
        .ingest_data(corpus())
        .embedder(Some(embedder()))
        .store(store.clone())
        .build()?;
    component.search("pricing").await?;
    component.search("office").await?;
    let handle = component.vector_store().await?;
    assert_eq!(handle.list(None).await?.len(), 5, "ingestion ran exactly once");
    assert_eq!(store.len().await, 5);
    Ok(())
}

#[tokio::test]
async fn empty_query_fails_closed_and_clears_the_cache() -> anyhow::Result<()> {
    let component = RetrievalComponent::builder(Settings::default())
        .ingest_data(corpus())
        .embedder(Some(embedder()))
        .build()?;
    component.search("pricing").await?;
    assert!(component.cached_results().await.is_some());

    let results = component.search("   ").await?;
    assert!(results.is_empty());
    assert!(component.cached_results().await.is_none());
    Ok(())
}

#[tokio::test]
async fn sticky_cache_keeps_the_first_search() -> anyhow::Result<()> {
    let component = RetrievalComponent::builder(Settings::default())
        .ingest_data(corpus())
        .embedder(Some(embedder()))
        .build()?;
    let first = component.search("enterprise").await?;
    let second = component.search("office hours").await?;
    assert_ne!(contents(first.documents())[0], contents(second.documents())[0]);
    assert_eq!(component.cached_results().await, Some(first));
    Ok(())
}

#[tokio::test]
async fn refresh_cache_follows_the_latest_search() -> anyhow::Result<()> {
    let mut settings = Settings::default();
    settings.search.cache_policy = sieve_core::config::CachePolicy::Refresh;
    let component = RetrievalComponent::builder(settings).ingest_data(corpus()).embedder(Some(embedder())).build()?;
    component.search("enterprise").await?;
    let second = component.search("office hours").await?;
    assert_eq!(component.cached_results().await, Some(second));
    Ok(())
}

#[tokio::test]
async fn backend_errors_propagate() {
    let component = RetrievalComponent::builder(Settings::default())
        .embedder(Some(embedder()))
        .store(Arc::new(BrokenStore))
        .build()
        .expect("component");
    let err = component.search("pricing").await.expect_err("backend failure");
    assert!(matches!(err, Error::Backend(_)));
}

#[tokio::test]
async fn missing_embedding_yields_an_empty_search() -> anyhow::Result<()> {
    let component = RetrievalComponent::builder(Settings::default()).ingest_data(corpus()).embedder(None).build()?;
    let results = component.search("pricing").await?;
    assert!(results.is_empty());
    assert!(matches!(component.status().await, ComponentStatus::Message(_)));
    Ok(())
}

#[tokio::test]
async fn sequential_filter_drops_only_the_failed_candidate() {
    let model = ScriptedModel::new(vec![Ok("relevant"), Err("timeout"), Ok("yes"), Ok("相关")]);
    let filter = SequentialFilter::new(model.clone(), 2000);
    let kept = filter.filter("q", docs(&["a", "b", "c", "d"])).await;
    assert_eq!(contents(&kept), vec!["a", "c", "d"]);
    assert_eq!(model.calls(), 4, "a failure does not abort the batch");
}

#[tokio::test]
async fn sequential_filter_applies_verdicts() {
    let model = ScriptedModel::new(vec![Ok("irrelevant"), Ok("Relevant."), Ok("不相关")]);
    let filter = SequentialFilter::new(model, 2000);
    let kept = filter.filter("q", docs(&["a", "b", "c"])).await;
    assert_eq!(contents(&kept), vec!["b"]);
}

#[tokio::test]
async fn sequential_filter_truncates_long_content() {
    let model = ScriptedModel::new(vec![Ok("relevant")]);
    let filter = SequentialFilter::new(model.clone(), 10);
    let long = "x".repeat(50);
    filter.filter("q", docs(&[long.as_str()])).await;
    let prompt = model.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains(&format!("{}...", "x".repeat(10))));
    assert!(!prompt.contains(&"x".repeat(11)));
}

#[tokio::test]
async fn concurrent_sequential_filter_keeps_order_and_policy() {
    let filter = SequentialFilter::new(Arc::new(KeywordModel), 2000).with_concurrency(4);
    let input = docs(&["keep 1", "drop 2", "keep boom 3", "keep 4", "drop 5", "keep 6"]);
    let kept = filter.filter("q", input).await;
    assert_eq!(contents(&kept), vec!["keep 1", "keep 4", "keep 6"]);
}

#[tokio::test]
async fn sequential_filter_runs_on_a_spawned_task() {
    let filter: Arc<dyn RelevanceFilter> =
        Arc::new(SequentialFilter::new(Arc::new(KeywordModel), 2000).with_concurrency(2));
    let input = docs(&["keep a", "drop b", "keep c"]);
    let kept = tokio::spawn(async move { filter.filter("q", input).await }).await.expect("join");
    assert_eq!(contents(&kept), vec!["keep a", "keep c"]);
}

#[tokio::test]
async fn sequential_filter_treats_english_denials_as_irrelevant() {
    let model = ScriptedModel::new(vec![Ok("No, it isn't relevant."), Ok("Not really relevant"), Ok("Yes, relevant")]);
    let filter = SequentialFilter::new(model, 2000);
    let kept = filter.filter("q", docs(&["a", "b", "c"])).await;
    assert_eq!(contents(&kept), vec!["c"]);
}

#[tokio::test]
async fn batched_filter_keeps_flagged_candidates() {
    let model = ScriptedModel::new(vec![Ok("[false, true, true]")]);
    let filter = BatchedFilter::new(model.clone(), 2000);
    let kept = filter.filter("q", docs(&["a", "b", "c"])).await;
    assert_eq!(contents(&kept), vec!["b", "c"]);
    assert_eq!(model.calls(), 1);
    let prompt = model.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains(r#"{"index":2,"content":"c"}"#));
}

#[tokio::test]
async fn batched_filter_falls_back_on_unparseable_reply() {
    let input = docs(&["a", "b", "c"]);
    for reply in ["Sure! [true, false, true]", "[1, 0, 1]", "relevant"] {
        let filter = BatchedFilter::new(ScriptedModel::new(vec![Ok(reply)]), 2000);
        let kept = filter.filter("q", input.clone()).await;
        assert_eq!(kept, input, "reply {reply:?} keeps everything");
    }
}

#[tokio::test]
async fn batched_filter_falls_back_on_model_error() {
    let input = docs(&["a", "b"]);
    let filter = BatchedFilter::new(ScriptedModel::new(vec![Err("503")]), 2000);
    assert_eq!(filter.filter("q", input.clone()).await, input);
}

#[tokio::test]
async fn batched_filter_short_reply_uses_out_of_range_policy() {
    let input = docs(&["a", "b", "c"]);

    let include = BatchedFilter::new(ScriptedModel::new(vec![Ok("[false]")]), 2000);
    assert_eq!(contents(&include.filter("q", input.clone()).await), vec!["b", "c"]);

    let exclude = BatchedFilter::new(ScriptedModel::new(vec![Ok("[true]")]), 2000)
        .with_out_of_range(OutOfRangePolicy::Exclude);
    assert_eq!(contents(&exclude.filter("q", input).await), vec!["a"]);
}

async fn three_result_component() -> anyhow::Result<RetrievalComponent> {
    let component = RetrievalComponent::builder(Settings::default())
        .ingest_data(docs(&["pricing one", "pricing two", "pricing three"]))
        .embedder(Some(embedder()))
        .build()?;
    component.search("pricing").await?;
    Ok(component)
}

#[tokio::test]
async fn selection_round_trip() -> anyhow::Result<()> {
    let component = three_result_component().await?;
    let cached = component.cached_results().await.expect("cached");

    let picked = component.selected_results("pricing", &SelectionInput::from(r#"["0","2"]"#)).await?;
    assert_eq!(picked, vec![cached.documents()[0].clone(), cached.documents()[2].clone()]);
    assert_eq!(component.status().await, ComponentStatus::Selected { selected: 2, total: 3 });

    let none = component.selected_results("pricing", &SelectionInput::from("[]")).await?;
    assert!(none.is_empty());
    assert_eq!(
        component.status().await.to_string(),
        "No results selected. Please select results from the search results."
    );

    let omitted = component.selected_results("pricing", &SelectionInput::Omitted).await?;
    assert!(omitted.is_empty());

    let out_of_range = component.selected_results("pricing", &SelectionInput::from(r#"["9"]"#)).await?;
    assert!(out_of_range.is_empty());
    Ok(())
}

#[tokio::test]
async fn malformed_selection_is_empty_not_an_error() -> anyhow::Result<()> {
    let component = three_result_component().await?;
    let picked = component.selected_results("pricing", &SelectionInput::from("[0, oops")).await?;
    assert!(picked.is_empty());
    assert!(matches!(component.status().await, ComponentStatus::Message(m) if m.starts_with("Error parsing")));
    Ok(())
}

#[tokio::test]
async fn selection_searches_lazily_when_nothing_is_cached() -> anyhow::Result<()> {
    let component = RetrievalComponent::builder(Settings::default())
        .ingest_data(docs(&["pricing one", "pricing two"]))
        .embedder(Some(embedder()))
        .build()?;
    let picked = component.selected_results("pricing", &SelectionInput::from("[1]")).await?;
    assert_eq!(picked.len(), 1);
    assert_eq!(picked[0].sequence_index, Some(1));
    Ok(())
}

#[tokio::test]
async fn selection_without_results_reports_it() -> anyhow::Result<()> {
    let component = RetrievalComponent::builder(Settings::default()).embedder(Some(embedder())).build()?;
    let picked = component.selected_results("", &SelectionInput::from("[0]")).await?;
    assert!(picked.is_empty());
    assert_eq!(
        component.status().await.to_string(),
        "No search results available. Please run a search first."
    );
    Ok(())
}

#[tokio::test]
async fn pricing_scenario_end_to_end() -> anyhow::Result<()> {
    // two of the five documents are already stored
    let store = memory_store();
    store.add(&corpus()[..2]).await?;

    let mut settings = Settings::default();
    settings.filter = FilterSettings { enabled: true, strategy: FilterStrategy::Batched, ..FilterSettings::default() };
    let model = ScriptedModel::new(vec![Ok("[true,false,true,true,false]")]);
    let component = RetrievalComponent::builder(settings)
        .ingest_data(corpus())
        .embedder(Some(embedder()))
        .model(model.clone())
        .store(store.clone())
        .build()?;

    let handle = component.vector_store().await?;
    assert_eq!(store.len().await, 5, "duplicates were not written again");
    let raw = handle.similarity_search("pricing", SearchMode::Similarity, 10).await?;
    assert_eq!(raw.len(), 5);

    let results = component.search("pricing").await?;
    assert_eq!(model.calls(), 1);
    assert_eq!(contents(results.documents()), contents(&[raw[0].clone(), raw[2].clone(), raw[3].clone()]));
    let positions: Vec<_> = results.iter().map(|d| d.sequence_index).collect();
    assert_eq!(positions, vec![Some(0), Some(1), Some(2)]);

    let rows = component.cached_results().await.expect("cached").as_rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2]["_index"], 2);
    Ok(())
}
