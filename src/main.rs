use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use sitechat_backend::core::config::{AppPaths, ConfigService};
use sitechat_backend::core::logging;
use sitechat_backend::server;
use sitechat_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = Arc::new(AppPaths::new());
    logging::init(&paths);

    let config = ConfigService::new(Arc::clone(&paths))
        .load_app_config()
        .context("Failed to load configuration")?;
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState::initialize(config, &paths)
        .await
        .context("Failed to initialize application state")?;

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    println!("SITECHAT_PORT={}", addr.port());
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
