//! LanceDB-backed persistent collection.
//!
//! One table per collection with `id`, `content`, `metadata` (JSON text) and a
//! fixed-width `vector` column sized by the embedder. The table is opened or
//! created on first use and the handle kept for the store's lifetime.

use arrow_array::cast::AsArray;
use arrow_array::{Array, FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use std::sync::Arc;
use tokio::sync::OnceCell;

use sieve_core::types::metadata_from_json;
use sieve_core::{Document, DocumentId, Embedder, Error, Metadata, Result, SearchMode, VectorStore};

use crate::mmr::{mmr_select, MmrParams};
use crate::schema::build_collection_schema;
use crate::{assign_missing_ids, backend_err, require_embedder};

pub struct LanceStore {
    db: Connection,
    table_name: String,
    embedder: Option<Arc<dyn Embedder>>,
    mmr: MmrParams,
    table: OnceCell<Table>,
}

impl LanceStore {
    pub async fn open(
        uri: &str,
        table_name: &str,
        embedder: Option<Arc<dyn Embedder>>,
        mmr: MmrParams,
    ) -> Result<Self> {
        let db = connect(uri).execute().await.map_err(backend_err)?;
        tracing::info!(uri, table = table_name, "opened lancedb");
        Ok(Self { db, table_name: table_name.to_string(), embedder, mmr, table: OnceCell::new() })
    }

    async fn table_exists(&self) -> Result<bool> {
        let names = self.db.table_names().execute().await.map_err(backend_err)?;
        Ok(names.contains(&self.table_name))
    }

    /// Opens the table, creating an empty one when it does not exist yet.
    async fn table(&self, dim: usize) -> Result<&Table> {
        self.table
            .get_or_try_init(|| async {
                if !self.table_exists().await? {
                    let schema = build_collection_schema(dim_i32(dim)?);
                    let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
                    self.db.create_table(&self.table_name, Box::new(iter)).execute().await.map_err(backend_err)?;
                    tracing::info!(table = %self.table_name, dim, "created collection table");
                }
                self.db.open_table(&self.table_name).execute().await.map_err(backend_err)
            })
            .await
    }

    /// Opens the table only if it exists; reads never create it.
    async fn existing_table(&self) -> Result<Option<&Table>> {
        if let Some(t) = self.table.get() {
            return Ok(Some(t));
        }
        if !self.table_exists().await? {
            return Ok(None);
        }
        let table = self
            .table
            .get_or_try_init(|| async { self.db.open_table(&self.table_name).execute().await.map_err(backend_err) })
            .await?;
        Ok(Some(table))
    }

    fn docs_to_record_batch(&self, docs: &[Document], vectors: Vec<Vec<f32>>, dim: usize) -> Result<RecordBatch> {
        let dim = dim_i32(dim)?;
        let mut ids = Vec::with_capacity(docs.len());
        let mut contents = Vec::with_capacity(docs.len());
        let mut metas = Vec::with_capacity(docs.len());
        let mut vecs: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(docs.len());
        for (doc, v) in docs.iter().zip(vectors) {
            if v.len() != dim as usize {
                return Err(Error::Embedding(format!("dim mismatch: got {} expected {}", v.len(), dim)));
            }
            ids.push(doc.id.clone().unwrap_or_default());
            contents.push(doc.content.clone());
            metas.push(metadata_to_string(&doc.metadata)?);
            vecs.push(Some(v.into_iter().map(Some).collect()));
        }
        RecordBatch::try_new(
            build_collection_schema(dim),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(metas)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(
                    vecs.into_iter(),
                    dim,
                )),
            ],
        )
        .map_err(backend_err)
    }
}

fn dim_i32(dim: usize) -> Result<i32> {
    i32::try_from(dim).map_err(|_| Error::InvalidConfig(format!("embedding dimension {dim} is too large")))
}

fn metadata_to_string(meta: &Metadata) -> Result<String> {
    let map: serde_json::Map<String, serde_json::Value> = meta.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
    Ok(serde_json::to_string(&map)?)
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::Backend(format!("missing {name} column")))
}

/// Decodes rows into documents, carrying vectors along when the batch has them.
fn batch_to_documents(batch: &RecordBatch) -> Result<Vec<(Document, Option<Vec<f32>>)>> {
    let id_col = string_col(batch, "id")?;
    let content_col = string_col(batch, "content")?;
    let meta_col = string_col(batch, "metadata")?;
    let vec_col = batch.column_by_name("vector").and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>());

    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let metadata = match serde_json::from_str::<serde_json::Value>(meta_col.value(i))? {
            serde_json::Value::Object(map) => metadata_from_json(&map),
            _ => Metadata::new(),
        };
        let id = id_col.value(i);
        let doc = Document {
            id: (!id.is_empty()).then(|| id.to_string()),
            sequence_index: None,
            content: content_col.value(i).to_string(),
            metadata,
        };
        let vector = vec_col.filter(|c| c.is_valid(i)).map(|c| {
            c.value(i).as_primitive::<arrow_array::types::Float32Type>().values().iter().copied().collect::<Vec<f32>>()
        });
        out.push((doc, vector));
    }
    Ok(out)
}

#[async_trait]
impl VectorStore for LanceStore {
    fn collection_name(&self) -> &str {
        &self.table_name
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
            return Err(Error::Embedding("embedder returned wrong count".into()));
        }

        let table = self.table(embedder.dim()).await?;
        let batch = self.docs_to_record_batch(&docs, vectors, embedder.dim())?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        table.add(reader).execute().await.map_err(backend_err)?;
        tracing::info!(table = %self.table_name, added = docs.len(), "lancedb add");
        Ok(docs.into_iter().filter_map(|d| d.id).collect())
    }

    async fn list(&self, limit: Option<usize>) -> Result<Vec<Document>> {
        let Some(table) = self.existing_table().await? else {
            return Ok(Vec::new());
        };
        let mut query = table.query();
        if let Some(n) = limit {
            query = query.limit(n);
        }
        let mut stream = query.execute().await.map_err(backend_err)?;
        let mut docs = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(backend_err)? {
            docs.extend(batch_to_documents(&batch)?.into_iter().map(|(d, _)| d));
        }
        if let Some(n) = limit {
            docs.truncate(n);
        }
        Ok(docs)
    }

    async fn similarity_search(&self, query: &str, mode: SearchMode, k: usize) -> Result<Vec<Document>> {
        let embedder = require_embedder(self.embedder.as_ref())?;
        let Some(table) = self.existing_table().await? else {
            return Ok(Vec::new());
        };
        let q = embedder.embed_query(query).await?;
        let fetch = match mode {
            SearchMode::Similarity => k,
            SearchMode::Mmr => self.mmr.fetch_k.max(k),
        };
        let mut stream = table
            .vector_search(q.clone())
            .map_err(backend_err)?
            .distance_type(DistanceType::Cosine)
            .limit(fetch)
            .execute()
            .await
            .map_err(backend_err)?;

        // results arrive ordered by ascending `_distance`
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(backend_err)? {
            hits.extend(batch_to_documents(&batch)?);
        }
        tracing::debug!(table = %self.table_name, hits = hits.len(), ?mode, "lancedb search");

        match mode {
            SearchMode::Similarity => Ok(hits.into_iter().take(k).map(|(d, _)| d).collect()),
            SearchMode::Mmr => {
                let vectors: Vec<Vec<f32>> = hits.iter().map(|(_, v)| v.clone().unwrap_or_default()).collect();
                let order = mmr_select(&q, &vectors, k, self.mmr.lambda);
                Ok(order.into_iter().map(|i| hits[i].0.clone()).collect())
            }
        }
    }
}
