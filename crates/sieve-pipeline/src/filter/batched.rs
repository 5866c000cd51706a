use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use sieve_core::config::OutOfRangePolicy;
use sieve_core::{Document, Error, LanguageModel, Result};

use super::{excerpt, RelevanceFilter};

#[derive(Serialize)]
struct Candidate<'a> {
    index: usize,
    content: &'a str,
}

/// Parses a reply that must be exactly a JSON array of booleans, optionally
/// wrapped in a Markdown code fence.
pub fn parse_flags(reply: &str) -> Result<Vec<bool>> {
    let body = strip_code_fence(reply.trim());
    serde_json::from_str::<Vec<bool>>(body).map_err(|e| Error::ReplyFormat(format!("expected a boolean array: {e}")))
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // drop the info string (e.g. `json`) on the opening line
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

pub struct BatchedFilter {
    model: Arc<dyn LanguageModel>,
    max_chars: usize,
    out_of_range: OutOfRangePolicy,
}

impl BatchedFilter {
    pub fn new(model: Arc<dyn LanguageModel>, max_chars: usize) -> Self {
        Self { model, max_chars, out_of_range: OutOfRangePolicy::Include }
    }

    #[must_use]
    pub fn with_out_of_range(mut self, policy: OutOfRangePolicy) -> Self {
        self.out_of_range = policy;
        self
    }

    fn prompt(&self, query: &str, candidates: &[Document]) -> Result<String> {
        let excerpts: Vec<String> = candidates.iter().map(|d| excerpt(&d.content, self.max_chars)).collect();
        let items: Vec<Candidate<'_>> = excerpts
            .iter()
            .enumerate()
            .map(|(index, content)| Candidate { index, content: content.as_str() })
            .collect();
        let items_json = serde_json::to_string(&items)?;
        Ok(format!(
            "You judge document relevance. Given a search query and a list of candidate documents, decide for \
             each document whether it is strongly relevant to the query, meaning the answer the query asks for \
             can be extracted from it directly. Once earlier documents already answer the query, judge later \
             ones as not relevant.\n\n\
             Search query: {query}\n\n\
             Candidates (JSON array, each with `index` and `content`):\n{items_json}\n\n\
             Return only a JSON array of booleans whose i-th element says whether the document with index i \
             is relevant, for example: [true, false, true]. No other text."
        ))
    }

    async fn verdicts(&self, query: &str, candidates: &[Document]) -> Result<Vec<bool>> {
        let prompt = self.prompt(query, candidates)?;
        let reply = self.model.invoke(&prompt).await?;
        parse_flags(&reply.content)
    }
}

#[async_trait]
impl RelevanceFilter for BatchedFilter {
    fn name(&self) -> &'static str {
        "batched"
    }

    async fn filter(&self, query: &str, candidates: Vec<Document>) -> Vec<Document> {
        if candidates.is_empty() {
            return candidates;
        }
        let total = candidates.len();
        tracing::info!(candidates = total, "filtering results in one batch");

        let flags = match self.verdicts(query, &candidates).await {
            Ok(flags) => flags,
            Err(e) => {
                tracing::warn!(error = %e, "batch relevance check failed; keeping unfiltered results");
                return candidates;
            }
        };
        if flags.len() != total {
            tracing::warn!(
                flags = flags.len(),
                candidates = total,
                policy = ?self.out_of_range,
                "verdict count mismatch"
            );
        }

        let default = self.out_of_range == OutOfRangePolicy::Include;
        let kept: Vec<Document> = candidates
            .into_iter()
            .enumerate()
            .filter_map(|(i, doc)| {
                let keep = flags.get(i).copied().unwrap_or(default);
                tracing::debug!(result = i + 1, total, keep, "batched verdict");
                keep.then_some(doc)
            })
            .collect();
        tracing::info!(before = total, after = kept.len(), "filtering done");
        kept
    }
}
