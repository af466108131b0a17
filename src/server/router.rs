use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::server::handlers::{
    convert_handler, download_handler, health_handler, progress_handler, start_handler,
};
use crate::server::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let upload_limit = DefaultBodyLimit::max(state.config.max_upload_bytes());

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/convert", post(convert_handler))
        .route("/api/convert/start", post(start_handler))
        .route("/api/convert/progress", get(progress_handler))
        .route("/api/convert/download", get(download_handler))
        .layer(upload_limit)
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}
