use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::provider::Embedder;
use crate::core::config::EmbeddingConfig;
use crate::core::deadline::with_deadline;
use crate::core::errors::ApiError;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// OpenAI-compatible `/embeddings` client.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    timeout: Duration,
    max_retries: usize,
    client: Client,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, dimension: usize) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimension,
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            client: Client::new(),
        }
    }

    async fn request_once(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, Attempt> {
        let url = format!("{}/embeddings", self.base_url);
        let mut body = json!({
            "model": self.model,
            "input": inputs,
        });
        // text-embedding-3-* can shorten vectors server side.
        if self.model.starts_with("text-embedding-3") {
            if let Some(obj) = body.as_object_mut() {
                obj.insert("dimensions".to_string(), json!(self.dimension));
            }
        }

        let mut request = self.client.post(&url).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let res = request
            .send()
            .await
            .map_err(|e| Attempt::Retry(ApiError::Internal(format!("Embedding request failed: {}", e))))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            let err = ApiError::Internal(format!("Embedding error ({}): {}", status, text));
            return Err(if is_retryable(status) {
                Attempt::Retry(err)
            } else {
                Attempt::Fatal(err)
            });
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| Attempt::Fatal(ApiError::internal(e)))?;
        parse_embeddings(&payload, inputs.len()).map_err(Attempt::Fatal)
    }
}

enum Attempt {
    Retry(ApiError),
    Fatal(ApiError),
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Vectors from an `/embeddings` payload, ordered by their `index` field.
fn parse_embeddings(payload: &Value, expected: usize) -> Result<Vec<Vec<f32>>, ApiError> {
    let data = payload["data"]
        .as_array()
        .ok_or_else(|| ApiError::Internal("Embedding response has no data".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item["index"].as_u64().map(|i| i as usize).unwrap_or(position);
        let vector: Vec<f32> = item["embedding"]
            .as_array()
            .ok_or_else(|| ApiError::Internal("Embedding item has no vector".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(index, _)| *index);

    if indexed.len() != expected {
        return Err(ApiError::Internal(format!(
            "Embedding count mismatch: {} != {}",
            indexed.len(),
            expected
        )));
    }
    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 0;
        let vectors = loop {
            let result = with_deadline("embedding", self.timeout, async {
                Ok(self.request_once(inputs).await)
            })
            .await?;
            match result {
                Ok(vectors) => break vectors,
                Err(Attempt::Retry(err)) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %err, "Embedding request failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(Attempt::Retry(err)) | Err(Attempt::Fatal(err)) => return Err(err),
            }
        };

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(ApiError::Internal(format!(
                "Embedding dimension mismatch: {} != {}",
                bad.len(),
                self.dimension
            )));
        }
        Ok(vectors)
    }
}
