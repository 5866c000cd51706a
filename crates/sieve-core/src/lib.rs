//! Shared model, capability traits, error taxonomy and configuration for sieve.

pub mod config;
pub mod error;
pub mod extract;
pub mod loader;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{Embedder, LanguageModel, ModelReply, VectorStore};
pub use types::{Document, DocumentId, MetaValue, Metadata, SearchMode};
