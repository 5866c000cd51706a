//! The retrieval component: one instance owns a memoized store handle, the
//! cached result set that selections resolve against, and a status line.

use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

use sieve_core::config::Settings;
use sieve_core::{Document, Embedder, LanguageModel, Result, VectorStore};
use sieve_llm::OpenAiCompatibleModel;
use sieve_vector::open_store;

use crate::filter::{build_filter, RelevanceFilter};
use crate::ingest::ingest_documents;
use crate::results::{ResultCache, ResultSet, Row};
use crate::selection::{resolve, SelectionInput};
use crate::status::{ComponentStatus, NO_SEARCH_RESULTS, NO_SELECTION};

pub struct RetrievalComponent {
    settings: Settings,
    ingest_data: Vec<Document>,
    embedder: Option<Arc<dyn Embedder>>,
    filter: Option<Box<dyn RelevanceFilter>>,
    injected_store: Option<Arc<dyn VectorStore>>,
    store: OnceCell<Arc<dyn VectorStore>>,
    cache: ResultCache,
    status: Mutex<ComponentStatus>,
}

#[derive(Default)]
pub struct RetrievalComponentBuilder {
    settings: Settings,
    ingest_data: Vec<Document>,
    embedder: Option<Option<Arc<dyn Embedder>>>,
    model: Option<Arc<dyn LanguageModel>>,
    store: Option<Arc<dyn VectorStore>>,
}

impl RetrievalComponentBuilder {
    /// Documents written to the store the first time it is built.
    #[must_use]
    pub fn ingest_data(mut self, documents: Vec<Document>) -> Self {
        self.ingest_data = documents;
        self
    }

    /// Overrides the embedder built from `settings.embedding`; `None` disables embedding.
    #[must_use]
    pub fn embedder(mut self, embedder: Option<Arc<dyn Embedder>>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Overrides the model built from `settings.llm`.
    #[must_use]
    pub fn model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Uses an existing store instead of opening one from `settings.store`.
    /// It should embed with the same embedder as the component.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<RetrievalComponent> {
        let embedder = match self.embedder {
            Some(e) => e,
            None => sieve_embed::embedder_from_config(&self.settings.embedding)?,
        };
        let model = match (self.model, &self.settings.llm) {
            (Some(m), _) => Some(m),
            (None, Some(llm)) if self.settings.filter.enabled => {
                Some(Arc::new(OpenAiCompatibleModel::from_settings(llm)?) as Arc<dyn LanguageModel>)
            }
            _ => None,
        };
        let filter = build_filter(&self.settings.filter, model);
        Ok(RetrievalComponent {
            cache: ResultCache::new(self.settings.search.cache_policy),
            settings: self.settings,
            ingest_data: self.ingest_data,
            embedder,
            filter,
            injected_store: self.store,
            store: OnceCell::new(),
            status: Mutex::new(ComponentStatus::Idle),
        })
    }
}

impl RetrievalComponent {
    pub fn builder(settings: Settings) -> RetrievalComponentBuilder {
        RetrievalComponentBuilder { settings, ..RetrievalComponentBuilder::default() }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn status(&self) -> ComponentStatus {
        self.status.lock().await.clone()
    }

    async fn set_status(&self, status: ComponentStatus) {
        *self.status.lock().await = status;
    }

    /// The cached result set, if a search has populated it.
    pub async fn cached_results(&self) -> Option<ResultSet> {
        self.cache.get().await
    }

    /// The store handle, built and ingested into on first call and reused afterwards.
    /// A failed build is retried by the next call.
    pub async fn vector_store(&self) -> Result<Arc<dyn VectorStore>> {
        let store = self.store.get_or_try_init(|| self.build_store()).await?;
        Ok(Arc::clone(store))
    }

    async fn build_store(&self) -> Result<Arc<dyn VectorStore>> {
        let store = match &self.injected_store {
            Some(s) => Arc::clone(s),
            None => open_store(&self.settings.store, &self.settings.search, self.embedder.clone()).await?,
        };
        let report =
            ingest_documents(store.as_ref(), &self.ingest_data, &self.settings.ingest, self.embedder.is_some()).await?;
        if report.offered > 0 {
            tracing::info!(
                offered = report.offered,
                skipped = report.skipped_duplicates,
                added = report.added.len(),
                "ingestion finished"
            );
        }
        let stored = store.list(self.settings.ingest.limit).await?.len();
        self.set_status(ComponentStatus::Stored(stored)).await;
        Ok(store)
    }

    /// Runs `query` against the store, filters, enriches and offers the result to the cache.
    ///
    /// An empty query yields an empty result and clears the cache. Store
    /// errors propagate; a missing embedding capability yields an empty result.
    pub async fn search(&self, query: &str) -> Result<ResultSet> {
        if query.trim().is_empty() {
            self.cache.clear().await;
            self.set_status(ComponentStatus::Idle).await;
            return Ok(ResultSet::empty());
        }

        let store = self.vector_store().await?;
        let search = &self.settings.search;
        let raw = match store.similarity_search(query, search.search_type, search.number_of_results).await {
            Ok(raw) => raw,
            Err(e) if e.is_configuration() => {
                tracing::warn!(error = %e, "search skipped");
                self.set_status(ComponentStatus::message(format!("Search unavailable: {e}"))).await;
                return Ok(ResultSet::empty());
            }
            Err(e) => return Err(e),
        };
        tracing::debug!(query, hits = raw.len(), mode = ?search.search_type, "store returned candidates");

        let candidates = match &self.filter {
            Some(filter) => filter.filter(query, raw).await,
            None => raw,
        };
        let results = ResultSet::enrich(candidates);
        self.cache.offer(&results).await;
        self.set_status(ComponentStatus::Results(results.len())).await;
        Ok(results)
    }

    /// Resolves `selection` against the cached result set, searching for
    /// `query` first when nothing is cached.
    pub async fn selected_results(&self, query: &str, selection: &SelectionInput) -> Result<Vec<Document>> {
        let results = match self.cache.get().await {
            Some(cached) => cached,
            None => self.search(query).await?,
        };
        if results.is_empty() {
            self.set_status(ComponentStatus::message(NO_SEARCH_RESULTS)).await;
            return Ok(Vec::new());
        }

        let ids = match selection.parse() {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "could not parse selected result ids");
                self.set_status(ComponentStatus::message(format!("Error parsing selected result ids: {e}"))).await;
                return Ok(Vec::new());
            }
        };
        if ids.is_empty() {
            self.set_status(ComponentStatus::message(NO_SELECTION)).await;
            return Ok(Vec::new());
        }

        let selected = resolve(&results, &ids);
        tracing::info!(selected = selected.len(), total = results.len(), "resolved selection");
        self.set_status(ComponentStatus::Selected { selected: selected.len(), total: results.len() }).await;
        Ok(selected)
    }

    /// Search results for `query` as flat rows.
    pub async fn as_rows(&self, query: &str) -> Result<Vec<Row>> {
        Ok(self.search(query).await?.as_rows())
    }
}
