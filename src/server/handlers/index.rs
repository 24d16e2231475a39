use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn index_status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let info = state
        .index
        .info()
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Namespace not found: {}", state.index.namespace())))?;
    let vectors = state.index.count().await?;

    Ok(Json(json!({
        "namespace": info.name,
        "site": state.config.site.url,
        "dimension": info.dimension,
        "metric": info.metric,
        "vectors": vectors,
        "created_at": info.created_at,
    })))
}
