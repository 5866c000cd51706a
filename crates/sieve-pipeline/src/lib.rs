//! Retrieval with duplicate-aware ingestion, optional LLM relevance filtering
//! and a cached result set for later selection.

pub mod component;
pub mod filter;
pub mod ingest;
pub mod results;
pub mod selection;
pub mod status;

pub use component::{RetrievalComponent, RetrievalComponentBuilder};
pub use filter::{build_filter, BatchedFilter, RelevanceFilter, SequentialFilter};
pub use ingest::{ingest_documents, IngestReport};
pub use results::{ResultCache, ResultSet, Row};
pub use selection::{SelectionId, SelectionInput};
pub use status::ComponentStatus;
