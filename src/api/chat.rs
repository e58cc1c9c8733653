use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::error::EngineError;
use crate::models::{ChatRequest, ChatResponse};
use crate::rag;
use crate::state::AppState;

/// POST /chat — answer a question against the indexed repository.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<serde_json::Value>)> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "detail": "query is required" })),
        ));
    }

    match rag::answer(&state, query, req.model.as_deref()).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => Err(error_response(e)),
    }
}

/// Map engine errors to the stable wire shape. LLM failures are 502 (the
/// upstream misbehaved, not us); everything else is 500. Messages are
/// already redacted; stack digests only ever hit the logs.
fn error_response(e: EngineError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &e {
        EngineError::Answer(_) => StatusCode::BAD_GATEWAY,
        EngineError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::error!("chat request failed [{}]: {e}", e.stack_digest());
    (
        status,
        Json(serde_json::json!({ "kind": e.kind(), "detail": e.to_string() })),
    )
}
