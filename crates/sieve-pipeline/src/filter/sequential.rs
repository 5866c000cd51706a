use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

use sieve_core::{Document, LanguageModel};

use super::{excerpt, RelevanceFilter};

/// Checked before any affirmative marker, since "irrelevant" contains "relevant".
const NEGATIVE_MARKERS: [&str; 7] = [
    "irrelevant",
    "not relevant",
    "isn't relevant",
    "not really relevant",
    "not at all relevant",
    "不相关",
    "不是",
];
const AFFIRMATIVE_MARKERS: [&str; 4] = ["relevant", "yes", "相关", "是"];

/// Maps a free-text reply onto a verdict.
pub fn classify_reply(reply: &str) -> bool {
    let text = reply.trim().to_lowercase();
    if NEGATIVE_MARKERS.iter().any(|m| text.contains(m)) {
        return false;
    }
    AFFIRMATIVE_MARKERS.iter().any(|m| text.contains(m))
}

pub struct SequentialFilter {
    model: Arc<dyn LanguageModel>,
    max_chars: usize,
    concurrency: usize,
}

impl SequentialFilter {
    pub fn new(model: Arc<dyn LanguageModel>, max_chars: usize) -> Self {
        Self { model, max_chars, concurrency: 1 }
    }

    /// Calls in flight at once. Output order never depends on it.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    fn prompt(&self, query: &str, content: &str) -> String {
        format!(
            "You judge document relevance. Decide whether the document below is strongly relevant to the \
             search query, meaning the answer the query asks for can be extracted or inferred from it.\n\n\
             Search query: {query}\n\n\
             Document:\n{}\n\n\
             Answer with exactly \"relevant\" or \"irrelevant\" and nothing else.",
            excerpt(content, self.max_chars)
        )
    }

    /// Owned future for one candidate, so the buffered stream borrows nothing.
    fn judge(
        &self,
        position: usize,
        total: usize,
        prompt: String,
    ) -> impl std::future::Future<Output = bool> + Send + 'static {
        let model = Arc::clone(&self.model);
        async move {
            match model.invoke(&prompt).await {
                Ok(reply) => {
                    let keep = classify_reply(&reply.content);
                    tracing::debug!(result = position + 1, total, keep, "relevance verdict");
                    keep
                }
                Err(e) => {
                    tracing::warn!(
                        result = position + 1,
                        total,
                        error = %e,
                        "relevance check failed; dropping result"
                    );
                    false
                }
            }
        }
    }
}

#[async_trait]
impl RelevanceFilter for SequentialFilter {
    fn name(&self) -> &'static str {
        "sequential"
    }

    async fn filter(&self, query: &str, candidates: Vec<Document>) -> Vec<Document> {
        if candidates.is_empty() {
            return candidates;
        }
        let total = candidates.len();
        tracing::info!(candidates = total, concurrency = self.concurrency, "filtering results one by one");

        let prompts: Vec<String> = candidates.iter().map(|doc| self.prompt(query, &doc.content)).collect();

        // `buffered` yields in input order regardless of completion order
        let verdicts: Vec<bool> = stream::iter(prompts.into_iter().enumerate())
            .map(|(i, prompt)| self.judge(i, total, prompt))
            .buffered(self.concurrency)
            .collect()
            .await;

        let kept: Vec<Document> = candidates
            .into_iter()
            .zip(verdicts)
            .filter_map(|(doc, keep)| keep.then_some(doc))
            .collect();
        tracing::info!(before = total, after = kept.len(), "filtering done");
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affirmative_replies() {
        assert!(classify_reply("Relevant"));
        assert!(classify_reply("  yes, it answers the question"));
        assert!(classify_reply("相关"));
        assert!(classify_reply("是"));
    }

    #[test]
    fn negative_replies_win_over_substrings() {
        assert!(!classify_reply("Irrelevant"));
        assert!(!classify_reply("not relevant"));
        assert!(!classify_reply("不相关"));
        assert!(!classify_reply("不是"));
        assert!(!classify_reply("no"));
    }

    #[test]
    fn english_denials_are_negative() {
        assert!(!classify_reply("No, it isn't relevant."));
        assert!(!classify_reply("Not really relevant to the question"));
        assert!(!classify_reply("This is not at all relevant"));
        assert!(classify_reply("Yes, highly relevant"));
        assert!(!classify_reply(""));
    }
}
