//! Health check endpoint.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub background_tasks: usize,
}

/// GET /health: liveness plus the number of running background scans.
pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    let background = state.workflows.background();
    let status = if background.is_shutting_down() {
        "shutting_down"
    } else {
        "ok"
    };
    Json(HealthResponse {
        status,
        background_tasks: background.active(),
    })
}
