use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::RerankerConfig;
use crate::core::deadline::with_deadline;
use crate::core::errors::ApiError;
use crate::llm::Embedder;
use crate::vector_math;

/// Position of a candidate in the reranker input, with its new score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankHit {
    pub index: usize,
    pub score: f32,
}

#[async_trait]
pub trait Reranker: Send + Sync {
    /// At most `top_n` hits, best first. Every `index` points into `candidates`
    /// and appears once.
    async fn rerank(
        &self,
        query: &str,
        candidates: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, ApiError>;
}

/// Drops out-of-range and repeated indices, keeps order, truncates.
pub(crate) fn sanitize_hits(hits: Vec<RerankHit>, candidate_count: usize, top_n: usize) -> Vec<RerankHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|hit| hit.index < candidate_count && seen.insert(hit.index))
        .take(top_n)
        .collect()
}

/// Cohere-compatible `/v1/rerank` client.
#[derive(Clone)]
pub struct CohereReranker {
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    client: Client,
}

impl CohereReranker {
    pub fn new(config: &RerankerConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            client: Client::new(),
        }
    }

    async fn request(
        &self,
        query: &str,
        candidates: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, ApiError> {
        let url = format!("{}/v1/rerank", self.base_url);
        let body = json!({
            "model": self.model,
            "query": query,
            "documents": candidates,
            "top_n": top_n,
        });

        let mut req = self.client.post(&url).json(&body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let res = req.send().await.map_err(ApiError::retrieval)?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Retrieval(format!("Rerank error ({}): {}", status, text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::retrieval)?;
        parse_rerank_results(&payload)
    }
}

fn parse_rerank_results(payload: &Value) -> Result<Vec<RerankHit>, ApiError> {
    let results = payload["results"]
        .as_array()
        .ok_or_else(|| ApiError::Retrieval("Rerank response has no results".to_string()))?;

    let mut hits: Vec<RerankHit> = results
        .iter()
        .filter_map(|item| {
            let index = item["index"].as_u64()? as usize;
            let score = item["relevance_score"].as_f64().unwrap_or(0.0) as f32;
            Some(RerankHit { index, score })
        })
        .collect();
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(hits)
}

#[async_trait]
impl Reranker for CohereReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, ApiError> {
        if candidates.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }
        let hits = with_deadline("rerank", self.timeout, self.request(query, candidates, top_n)).await?;
        Ok(sanitize_hits(hits, candidates.len(), top_n))
    }
}

/// Reorders candidates by cosine similarity to the query under `embedder`.
pub struct EmbeddingReranker {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingReranker {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl Reranker for EmbeddingReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, ApiError> {
        if candidates.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }

        let mut inputs = Vec::with_capacity(candidates.len() + 1);
        inputs.push(query.to_string());
        inputs.extend(candidates.iter().cloned());

        let embeddings = self.embedder.embed(&inputs).await.map_err(ApiError::into_retrieval)?;
        if embeddings.len() != inputs.len() {
            return Err(ApiError::Retrieval(format!(
                "Rerank embedding size mismatch: {} != {}",
                embeddings.len(),
                inputs.len()
            )));
        }

        let ranking = vector_math::rank_descending(
            &embeddings[0],
            &embeddings[1..],
            vector_math::cosine_similarity,
        )
        .map_err(ApiError::into_retrieval)?;
        let hits = ranking
            .into_iter()
            .map(|(index, score)| RerankHit { index, score })
            .collect();
        Ok(sanitize_hits(hits, candidates.len(), top_n))
    }
}
