use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use uuid::Uuid;

use super::{error_response, xlsx_response, JobQuery};
use crate::jobs::JobStatus;
use crate::output::output_filename;
use crate::server::state::AppState;

/// The finished workbook. 404 unknown, 500 failed, 409 still running.
#[tracing::instrument(skip(state))]
pub async fn download_handler(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Response {
    let locale = state.locale;
    let Some(raw) = query.raw() else {
        return error_response(StatusCode::BAD_REQUEST, locale.job_id_required());
    };

    let Some(job) = Uuid::parse_str(raw).ok().and_then(|id| state.jobs.get(&id)) else {
        return error_response(StatusCode::NOT_FOUND, locale.job_not_found());
    };

    match (job.status, job.result) {
        (JobStatus::Done, Some(workbook)) => {
            tracing::info!(job_id = %job.id, bytes = workbook.len(), "Serving workbook");
            xlsx_response(workbook, &output_filename(&job.filename))
        }
        (JobStatus::Error, _) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            job.error
                .unwrap_or_else(|| locale.processing_failed().to_string()),
        ),
        _ => error_response(StatusCode::CONFLICT, locale.not_ready()),
    }
}
