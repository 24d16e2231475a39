use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// A single page could not be fetched during a crawl.
    #[error("fetch failed: {0}")]
    Fetch(String),
    /// Index creation or population failed; the namespace was not published.
    #[error("index build failed: {0}")]
    Build(String),
    /// The vector store, embedder or reranker could not serve a query.
    #[error("retrieval failed: {0}")]
    Retrieval(String),
    #[error("agent loop exceeded {max_iterations} iterations without a final answer")]
    AgentLoopExceeded { max_iterations: usize },
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn retrieval<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Retrieval(err.to_string())
    }

    /// Stable identifier surfaced to callers alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::ServiceUnavailable => "service_unavailable",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::Fetch(_) => "fetch_failure",
            ApiError::Build(_) => "build_failure",
            ApiError::Retrieval(_) => "retrieval_failure",
            ApiError::AgentLoopExceeded { .. } => "agent_loop_exceeded",
            ApiError::Timeout(_) => "timeout",
            ApiError::Internal(_) => "internal",
        }
    }

    /// Re-tags an error raised while building an index. Timeouts keep their kind.
    pub fn into_build(self) -> Self {
        match self {
            ApiError::Build(_) | ApiError::Timeout(_) => self,
            other => ApiError::Build(other.to_string()),
        }
    }

    /// Re-tags an error raised while serving a query. Timeouts keep their kind.
    pub fn into_retrieval(self) -> Self {
        match self {
            ApiError::Retrieval(_) | ApiError::Timeout(_) => self,
            other => ApiError::Retrieval(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ApiError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Fetch(_) | ApiError::Build(_) | ApiError::Retrieval(_) => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::AgentLoopExceeded { .. } | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}
