//! Background execution of one conversion job.
//!
//! [`spawn_job`] detaches a task per upload. The task reports through the
//! [`JobStore`] only; the HTTP request that created the job has already
//! returned, and a client watching the progress stream can disconnect
//! without affecting the conversion.

use crate::convert::Converter;
use crate::error::Pdf2XlsxError;
use crate::jobs::{JobId, JobStore, JobUpdate, UpdateOutcome};
use crate::progress::ConversionProgressCallback;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

/// Forwards pipeline progress into the job record.
struct JobProgress {
    store: JobStore,
    job_id: JobId,
    orphaned: AtomicBool,
}

impl ConversionProgressCallback for JobProgress {
    fn on_progress(&self, percent: u8, message: &str) {
        let update = JobUpdate::Progress {
            percent,
            message: message.to_string(),
        };
        if self.store.update(&self.job_id, update) == UpdateOutcome::Missing
            && !self.orphaned.swap(true, Ordering::Relaxed)
        {
            warn!("Job evicted while still processing; progress is no longer visible");
        }
    }

    fn on_page_empty(&self, page_num: usize, _total: Option<usize>, reason: &str) {
        info!("Page {}: {}", page_num, reason);
    }
}

/// Run the conversion of `pdf` for `job_id` on a detached task.
///
/// The conversion runs in its own inner task so that a panic anywhere in the
/// pipeline is observed as a `JoinError` and recorded as a failed job rather
/// than leaving the job stuck in `processing`.
pub fn spawn_job(
    store: JobStore,
    converter: Arc<Converter>,
    job_id: JobId,
    filename: &str,
    pdf: Bytes,
) -> JoinHandle<()> {
    let span = info_span!("conversion_job", job_id = %job_id, filename = %filename);
    tokio::spawn(run_job(store, converter, job_id, pdf).instrument(span))
}

async fn run_job(store: JobStore, converter: Arc<Converter>, job_id: JobId, pdf: Bytes) {
    let locale = converter.config().locale;
    info!("Job started ({} bytes)", pdf.len());

    let start = JobUpdate::Start {
        message: locale.starting().to_string(),
    };
    if store.update(&job_id, start) != UpdateOutcome::Applied {
        warn!("Job no longer queued; not starting");
        return;
    }

    let progress = Arc::new(JobProgress {
        store: store.clone(),
        job_id,
        orphaned: AtomicBool::new(false),
    });
    let conversion = tokio::spawn(
        async move { converter.convert_bytes(pdf, progress.as_ref()).await }.in_current_span(),
    );

    let update = match conversion.await {
        Ok(Ok(output)) => {
            info!(
                "Job done: {} rows, {} bytes",
                output.stats.row_count,
                output.workbook.len()
            );
            JobUpdate::Complete {
                workbook: Bytes::from(output.workbook),
                message: locale.done().to_string(),
            }
        }
        Ok(Err(Pdf2XlsxError::NoTableFound)) => {
            warn!("Job failed: no table found");
            JobUpdate::Fail {
                error: locale.no_table_error().to_string(),
                message: locale.failed().to_string(),
            }
        }
        Ok(Err(e)) => {
            error!("Job failed: {}", e);
            JobUpdate::Fail {
                error: e.to_string(),
                message: locale.failed().to_string(),
            }
        }
        Err(join_err) => {
            error!("Conversion task aborted: {}", join_err);
            JobUpdate::Fail {
                error: Pdf2XlsxError::Internal(format!("conversion task failed: {join_err}"))
                    .to_string(),
                message: locale.failed().to_string(),
            }
        }
    };

    match store.update(&job_id, update) {
        UpdateOutcome::Applied => {}
        UpdateOutcome::Missing => warn!("Job evicted before it finished; outcome discarded"),
        UpdateOutcome::Rejected => warn!("Job already terminal; outcome discarded"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::jobs::JobStatus;
    use crate::messages::Locale;
    use crate::pipeline::extract::{TableExtraction, TableExtractor};
    use crate::pipeline::render::{RenderedDocument, Rasterizer};
    use async_trait::async_trait;
    use image::DynamicImage;
    use serde_json::json;
    use std::time::Duration;

    const PDF: &[u8] = b"%PDF-1.4\n%%EOF";

    struct OnePage;

    #[async_trait]
    impl Rasterizer for OnePage {
        async fn rasterize(&self, _pdf: Bytes) -> Result<RenderedDocument, Pdf2XlsxError> {
            Ok(RenderedDocument::from_images(
                Some(1),
                vec![(0, DynamicImage::new_rgb8(2, 2))],
            ))
        }
    }

    enum Behaviour {
        Table,
        Empty,
        Panic,
    }

    #[async_trait]
    impl TableExtractor for Behaviour {
        async fn extract(&self, _: &DynamicImage, _: usize, _: bool) -> TableExtraction {
            match self {
                Behaviour::Table => {
                    TableExtraction::Table(vec![json!(["Name", "Amount"]), json!(["A", "10"])])
                }
                Behaviour::Empty => TableExtraction::Empty,
                Behaviour::Panic => panic!("extractor blew up"),
            }
        }
    }

    fn converter(behaviour: Behaviour, locale: Locale) -> Arc<Converter> {
        let config = ConversionConfig::builder().locale(locale).build().unwrap();
        Arc::new(Converter::new(Arc::new(OnePage), Arc::new(behaviour), config))
    }

    async fn run(behaviour: Behaviour, locale: Locale) -> crate::jobs::Job {
        let store = JobStore::new(Duration::from_secs(60));
        let id = store.create("doc.pdf", locale.queued()).id;
        let handle = spawn_job(
            store.clone(),
            converter(behaviour, locale),
            id,
            "doc.pdf",
            Bytes::from_static(PDF),
        );
        handle.await.unwrap();
        store.get(&id).unwrap()
    }

    #[tokio::test]
    async fn successful_job_holds_workbook() {
        let job = run(Behaviour::Table, Locale::En).await;
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.progress, 100);
        assert_eq!(job.message, "Done");
        assert!(job.result.unwrap().starts_with(b"PK"));
    }

    #[tokio::test]
    async fn no_table_is_a_localised_failure() {
        let job = run(Behaviour::Empty, Locale::PtBr).await;
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.message, "Falha");
        assert_eq!(job.error.as_deref(), Some(Locale::PtBr.no_table_error()));
        assert!(job.result.is_none());
    }

    #[tokio::test]
    async fn panic_in_pipeline_fails_the_job() {
        let job = run(Behaviour::Panic, Locale::En).await;
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.error.unwrap().contains("conversion task failed"));
    }

    #[tokio::test]
    async fn evicted_job_is_not_resurrected() {
        let store = JobStore::new(Duration::ZERO);
        let id = store.create("doc.pdf", "").id;
        store.sweep_at(chrono::Utc::now() + chrono::Duration::seconds(1));
        spawn_job(
            store.clone(),
            converter(Behaviour::Table, Locale::En),
            id,
            "doc.pdf",
            Bytes::from_static(PDF),
        )
        .await
        .unwrap();
        assert!(store.get(&id).is_none());
    }
}
