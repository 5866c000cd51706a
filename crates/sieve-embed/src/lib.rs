//! Embedding providers.
//!
//! `HashingEmbedder` is deterministic and offline: every token is hashed into
//! a bucket of a fixed-width vector. It gives stable lexical similarity for
//! development and tests. `HttpEmbedder` calls an OpenAI-compatible
//! `/embeddings` endpoint.

use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use twox_hash::XxHash64;

use sieve_core::config::{EmbeddingProvider, EmbeddingSettings};
use sieve_core::{Embedder, Error, Result};

pub mod remote;

pub use remote::HttpEmbedder;

pub struct HashingEmbedder {
    dim: usize,
    id: String,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("hashing:d{dim}") }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in tokens(text).enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Builds the configured embedding capability. `provider = "none"` is a valid
/// state and yields `None`; ingestion then becomes a no-op.
pub fn embedder_from_config(settings: &EmbeddingSettings) -> Result<Option<Arc<dyn Embedder>>> {
    match settings.provider {
        EmbeddingProvider::None => {
            tracing::info!("no embedding provider configured");
            Ok(None)
        }
        EmbeddingProvider::Hashing => {
            let dim = settings.resolved_dimension().unwrap_or_default();
            if dim == 0 {
                return Err(Error::InvalidConfig("embedding.dimension must be at least 1".into()));
            }
            tracing::info!(dim, "using hashing embedder");
            Ok(Some(Arc::new(HashingEmbedder::new(dim))))
        }
        EmbeddingProvider::OpenAi => {
            let embedder = HttpEmbedder::from_settings(settings)?;
            tracing::info!(model = %settings.model, api_base = %settings.api_base, "using http embedder");
            Ok(Some(Arc::new(embedder)))
        }
    }
}
