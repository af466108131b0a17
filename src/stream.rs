//! Progress publishing: a job's state as a stream of change events.
//!
//! The stream re-reads the job every `poll` interval and yields only when the
//! client-visible snapshot changed, so a slow page produces no traffic. It
//! ends by itself once the job is terminal, and yields a single
//! [`ProgressEvent::NotFound`] before ending when the job does not exist (or
//! has been evicted since the last poll).
//!
//! Dropping the stream (client disconnect) stops polling and nothing else;
//! the conversion keeps running in its own task.

use crate::jobs::{JobId, JobStore, ProgressSnapshot};
use async_stream::stream;
use serde_json::{json, Value};
use std::pin::Pin;
use std::time::Duration;
use tokio_stream::Stream;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Progress(ProgressSnapshot),
    /// Unknown or expired job; carries the user-facing message.
    NotFound(String),
}

impl ProgressEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::Progress(_) => "progress",
            ProgressEvent::NotFound(_) => "error",
        }
    }

    /// SSE data payload.
    pub fn payload(&self) -> Value {
        match self {
            ProgressEvent::Progress(snapshot) => json!(snapshot),
            ProgressEvent::NotFound(message) => json!({ "error": message }),
        }
    }
}

/// A boxed stream of progress events.
pub type ProgressStream = Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>;

/// Watch `job_id` in `store`. `None` is treated as an unknown job.
pub fn progress_stream(
    store: JobStore,
    job_id: Option<JobId>,
    poll: Duration,
    not_found_message: String,
) -> ProgressStream {
    Box::pin(stream! {
        let mut ticker = tokio::time::interval(poll);
        let mut last: Option<ProgressSnapshot> = None;

        loop {
            ticker.tick().await;

            let Some(snapshot) = job_id.and_then(|id| store.snapshot(&id)) else {
                yield ProgressEvent::NotFound(not_found_message.clone());
                break;
            };

            let terminal = snapshot.status.is_terminal();
            if last.as_ref() != Some(&snapshot) {
                last = Some(snapshot.clone());
                yield ProgressEvent::Progress(snapshot);
            }
            if terminal {
                break;
            }
        }
    })
}
