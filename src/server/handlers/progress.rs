use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use uuid::Uuid;

use super::{error_response, JobQuery};
use crate::server::state::AppState;
use crate::stream::progress_stream;

/// Server-sent `progress` events until the job is terminal; a single
/// `error` event for an unknown job.
#[tracing::instrument(skip(state))]
pub async fn progress_handler(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Response {
    let Some(raw) = query.raw() else {
        return error_response(StatusCode::BAD_REQUEST, state.locale.job_id_required());
    };
    let job_id = Uuid::parse_str(raw).ok();

    let events = progress_stream(
        state.jobs.clone(),
        job_id,
        state.config.progress_poll(),
        state.locale.job_not_found().to_string(),
    )
    .map(|event| Event::default().event(event.name()).json_data(event.payload()));

    Sse::new(events)
        .keep_alive(KeepAlive::new().interval(state.config.keep_alive()))
        .into_response()
}
