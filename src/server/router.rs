use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{agent, health, index, sessions};
use crate::state::AppState;

/// Creates the application router.
///
/// - `POST /agent/invoke`: one agent turn
/// - `GET /health`
/// - `GET /api/index`: namespace statistics
/// - `GET /api/sessions/:session_id/messages`: conversation log
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.config.server.cors_allowed_origins);
    Router::new()
        .route("/health", get(health::health))
        .route("/agent/invoke", post(agent::invoke))
        .route("/api/index", get(index::index_status))
        .route(
            "/api/sessions/:session_id/messages",
            get(sessions::get_session_messages),
        )
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(configured: &[String]) -> CorsLayer {
    let origins = resolve_allowed_origins(configured)
        .into_iter()
        .filter_map(|origin| HeaderValue::from_str(&origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}

fn resolve_allowed_origins(configured: &[String]) -> Vec<String> {
    let origins: Vec<String> = configured
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();

    if origins.is_empty() {
        return default_local_origins();
    }
    origins
}

fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:8000".to_string(),
    ]
}
