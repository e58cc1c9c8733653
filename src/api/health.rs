use axum::extract::State;
use axum::Json;

use crate::config::Config;
use crate::state::AppState;

/// GET /health — liveness plus a summary of what is configured.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let env_configured = Config::secrets_configured();
    let has_repo = !state.repos.read().is_empty();
    Json(serde_json::json!({
        "status": "ok",
        "env_configured": env_configured,
        "services": {
            "ingestion": env_configured,
            "rag": env_configured && has_repo,
        },
    }))
}
