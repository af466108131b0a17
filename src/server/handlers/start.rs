use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use super::{error_response, read_pdf_upload};
use crate::runner;
use crate::server::state::AppState;

#[derive(Serialize)]
pub struct StartResponse {
    #[serde(rename = "jobId")]
    pub job_id: String,
}

/// Accept an upload, queue a job and return its id without waiting.
#[tracing::instrument(skip(state, multipart))]
pub async fn start_handler(State(state): State<AppState>, multipart: Multipart) -> Response {
    let upload = match read_pdf_upload(multipart, state.locale).await {
        Ok(upload) => upload,
        Err(response) => return response,
    };

    let converter = match state.converter() {
        Ok(converter) => converter,
        Err(e) => {
            tracing::error!(error = %e, "Upload rejected: no inference provider");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                state.locale.provider_not_configured(),
            );
        }
    };

    let job = state.jobs.create(&upload.filename, state.locale.queued());
    runner::spawn_job(
        state.jobs.clone(),
        converter,
        job.id,
        &upload.filename,
        upload.bytes,
    );

    tracing::info!(job_id = %job.id, filename = %upload.filename, "Conversion job queued");

    (
        StatusCode::OK,
        Json(StartResponse {
            job_id: job.id.to_string(),
        }),
    )
        .into_response()
}
