//! LLM-backed relevance filtering.
//!
//! Two strategies with different failure policies sit behind one trait:
//! [`SequentialFilter`] judges candidates one by one and drops any whose
//! model call fails; [`BatchedFilter`] judges them in one call and returns
//! the input untouched when that call or its parse fails. Neither reorders
//! candidates, and neither surfaces an error.

use async_trait::async_trait;
use std::sync::Arc;

use sieve_core::config::{FilterSettings, FilterStrategy};
use sieve_core::{Document, LanguageModel};

mod batched;
mod sequential;

pub use batched::{parse_flags, BatchedFilter};
pub use sequential::{classify_reply, SequentialFilter};

#[async_trait]
pub trait RelevanceFilter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Keeps the candidates judged relevant to `query`, in their original order.
    async fn filter(&self, query: &str, candidates: Vec<Document>) -> Vec<Document>;
}

/// Builds the configured strategy. Returns `None` when filtering is off or
/// no model is available.
pub fn build_filter(
    settings: &FilterSettings,
    model: Option<Arc<dyn LanguageModel>>,
) -> Option<Box<dyn RelevanceFilter>> {
    if !settings.enabled {
        return None;
    }
    let Some(model) = model else {
        tracing::warn!("relevance filtering is enabled but no language model is configured; results are unfiltered");
        return None;
    };
    let filter: Box<dyn RelevanceFilter> = match settings.strategy {
        FilterStrategy::Sequential => {
            Box::new(SequentialFilter::new(model, settings.max_content_chars).with_concurrency(settings.concurrency))
        }
        FilterStrategy::Batched => {
            Box::new(BatchedFilter::new(model, settings.max_content_chars).with_out_of_range(settings.out_of_range))
        }
    };
    tracing::info!(strategy = filter.name(), "relevance filter enabled");
    Some(filter)
}

/// First `max_chars` characters of `content`, with `...` appended when cut.
pub fn excerpt(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_pos, _)) => format!("{}...", &content[..byte_pos]),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_counts_characters_not_bytes() {
        assert_eq!(excerpt("价格表很长", 2), "价格...");
        assert_eq!(excerpt("short", 5), "short");
        assert_eq!(excerpt("longer", 3), "lon...");
    }

    #[test]
    fn disabled_filter_is_not_built() {
        let settings = FilterSettings::default();
        assert!(build_filter(&settings, None).is_none());
    }

    #[test]
    fn enabled_without_model_is_not_built() {
        let settings = FilterSettings { enabled: true, ..FilterSettings::default() };
        assert!(build_filter(&settings, None).is_none());
    }
}
