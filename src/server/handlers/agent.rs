use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::AgentRequest;
use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    pub input: String,
    /// A new session is started when omitted.
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub output: String,
    pub session_id: String,
}

pub async fn invoke(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, ApiError> {
    let session_id = payload
        .session_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let response = state
        .agent
        .invoke(AgentRequest {
            input: payload.input,
            session_id: session_id.clone(),
        })
        .await
        .inspect_err(|err| {
            tracing::warn!(session_id = %session_id, kind = err.kind(), error = %err, "Agent invocation failed");
        })?;

    Ok(Json(InvokeResponse {
        output: response.output,
        session_id,
    }))
}
