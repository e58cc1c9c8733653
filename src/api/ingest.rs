use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::ingest::spawn_ingestion;
use crate::models::{IndexRepoRequest, IndexRepoResponse, ProgressResponse};
use crate::state::AppState;

/// POST /index_repo — start indexing a repository in the background.
/// 202 when accepted, 409 while another job is running.
pub async fn index_repo(
    State(state): State<AppState>,
    Json(req): Json<IndexRepoRequest>,
) -> Result<(StatusCode, Json<IndexRepoResponse>), (StatusCode, Json<serde_json::Value>)> {
    let repo_url = req.repo_url.trim().to_string();
    if repo_url.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "detail": "repo_url is required" })),
        ));
    }

    let cancel = state.job.try_start(&repo_url).map_err(|_| {
        (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "detail": "indexing in progress" })),
        )
    })?;

    spawn_ingestion(state, repo_url.clone(), cancel);

    Ok((
        StatusCode::ACCEPTED,
        Json(IndexRepoResponse {
            message: "Repository indexing started".to_string(),
            repo_url,
            status: "started".to_string(),
        }),
    ))
}

/// GET /progress — snapshot of the current (or last) ingestion job.
pub async fn progress(State(state): State<AppState>) -> Json<ProgressResponse> {
    Json(state.job.snapshot().into())
}
