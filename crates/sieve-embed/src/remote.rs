use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use sieve_core::config::EmbeddingSettings;
use sieve_core::{Embedder, Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// OpenAI-compatible `/embeddings` client.
pub struct HttpEmbedder {
    id: String,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dim: usize,
    client: reqwest::Client,
}

impl HttpEmbedder {
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        if settings.model.trim().is_empty() {
            return Err(Error::InvalidConfig("embedding.model is required for the openai provider".into()));
        }
        let dim = match settings.resolved_dimension() {
            Some(0) => return Err(Error::InvalidConfig("embedding.dimension must be at least 1".into())),
            Some(dim) => dim,
            None => {
                return Err(Error::InvalidConfig(format!(
                    "embedding.dimension is required for model '{}'",
                    settings.model
                )))
            }
        };
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Embedding(format!("http client: {e}")))?;
        Ok(Self {
            id: format!("openai:{}:d{}", settings.model, dim),
            endpoint: format!("{}/embeddings", settings.api_base.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key: settings.resolved_api_key(),
            dim,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Orders the returned vectors by their `index` and checks count and width.
pub(crate) fn parse_embeddings(body: &str, expected: usize, dim: usize) -> Result<Vec<Vec<f32>>> {
    let mut parsed: EmbeddingResponse =
        serde_json::from_str(body).map_err(|e| Error::Embedding(format!("malformed embeddings response: {e}")))?;
    if parsed.data.len() != expected {
        return Err(Error::Embedding(format!(
            "embedder returned {} vectors for {} inputs",
            parsed.data.len(),
            expected
        )));
    }
    if let Some(item) = parsed.data.iter().find(|item| item.embedding.len() != dim) {
        return Err(Error::Embedding(format!(
            "embedder returned {}-dimensional vectors, expected {dim}; set embedding.dimension to match the model",
            item.embedding.len()
        )));
    }
    parsed.data.sort_by_key(|item| item.index);
    Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({ "model": self.model, "input": texts });
        tracing::debug!(model = %self.model, inputs = texts.len(), "requesting embeddings");

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("request failed: {e}")))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Embedding(format!("reading response: {e}")))?;
        if !status.is_success() {
            return Err(Error::Embedding(format!("{status}: {text}")));
        }
        parse_embeddings(&text, texts.len(), self.dim)
    }
}
