use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use repo_rag::api;
use repo_rag::config::Config;
use repo_rag::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("vector backend: {}", config.vector.backend);
    tracing::info!("embedding model: {}", config.embedding.model);
    tracing::info!("chat model: {}", config.llm.chat_model);
    if !Config::secrets_configured() {
        tracing::warn!("API keys missing; ingestion and chat will fail until they are set");
    }

    let state = AppState::new(config.clone())?;

    let app = Router::new()
        .route("/index_repo", post(api::ingest::index_repo))
        .route("/progress", get(api::ingest::progress))
        .route("/chat", post(api::chat::chat))
        .route("/health", get(api::health::health))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
