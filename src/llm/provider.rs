use async_trait::async_trait;

use super::types::{CompletionRequest, ModelResponse};
use crate::core::errors::ApiError;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// return the model identifier used in logs
    fn name(&self) -> &str;

    /// one decision step: either a final answer or a single tool request
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelResponse, ApiError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// length of every vector this embedder returns
    fn dimension(&self) -> usize;

    /// embed a batch; output order matches input order
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Internal("Embedder returned no vector".to_string()))
    }
}
