use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::server::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub jobs: usize,
    pub converter: bool,
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            jobs: state.jobs.len(),
            converter: state.can_convert(),
        }),
    )
}
