use std::sync::Arc;
use std::time::Duration;

use super::index::{IndexHandle, RetrievedPassage};
use crate::core::config::RetrievalConfig;
use crate::core::deadline::with_deadline;
use crate::core::errors::ApiError;
use crate::tools::reranker::{sanitize_hits, Reranker};

/// Similarity search followed by a rerank of exactly those candidates.
#[derive(Clone)]
pub struct RetrievalPipeline {
    index: IndexHandle,
    reranker: Arc<dyn Reranker>,
    k: usize,
    top_n: usize,
    timeout: Duration,
}

impl RetrievalPipeline {
    pub fn new(index: IndexHandle, reranker: Arc<dyn Reranker>, config: &RetrievalConfig) -> Self {
        Self {
            index,
            reranker,
            k: config.k,
            top_n: config.top_n,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    /// At most `top_n` passages, each one of the `k` similarity candidates.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedPassage>, ApiError> {
        with_deadline("retrieval", self.timeout, self.run(query)).await
    }

    async fn run(&self, query: &str) -> Result<Vec<RetrievedPassage>, ApiError> {
        let candidates = self.index.search(query, self.k).await?;
        if candidates.is_empty() || self.top_n == 0 {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let hits = self
            .reranker
            .rerank(query, &texts, self.top_n)
            .await
            .map_err(ApiError::into_retrieval)?;

        let passages: Vec<RetrievedPassage> = sanitize_hits(hits, candidates.len(), self.top_n)
            .into_iter()
            .map(|hit| RetrievedPassage {
                relevance_score: hit.score,
                ..candidates[hit.index].clone()
            })
            .collect();

        tracing::debug!(
            namespace = %self.index.namespace(),
            candidates = candidates.len(),
            kept = passages.len(),
            "Retrieved passages"
        );
        Ok(passages)
    }
}
