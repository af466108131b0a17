//! Conversion entry points: PDF bytes in, formatted workbook out.
//!
//! [`Converter`] owns the two external collaborators (a [`Rasterizer`] and a
//! [`TableExtractor`]) and runs the pipeline in order:
//!
//! ```text
//! rasterise ─▶ extract page 1 ─▶ merge ─▶ … ─▶ extract page n ─▶ merge ─▶ workbook
//! ```
//!
//! Pages are processed strictly one after another. The extractor prompt for
//! a page depends on whether an earlier page already contributed rows, and
//! header deduplication compares against the first accumulated row, so
//! neither is well-defined under concurrent dispatch.

use crate::config::ConversionConfig;
use crate::error::Pdf2XlsxError;
use crate::output::{ConversionOutput, ConversionStats};
use crate::pipeline::extract::{TableExtraction, TableExtractor, VisionTableExtractor};
use crate::pipeline::input;
use crate::pipeline::merge::RowMerger;
use crate::pipeline::render::{PdfiumRasterizer, Rasterizer};
use crate::pipeline::workbook;
use crate::progress::{
    page_percent, ConversionProgressCallback, NoopProgressCallback, BUILD_PERCENT, DONE_PERCENT,
    RASTERIZE_PERCENT,
};
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runs conversions with a fixed rasteriser, extractor and configuration.
///
/// Cheap to share: the service holds one behind an `Arc` and every job
/// borrows it.
pub struct Converter {
    rasterizer: Arc<dyn Rasterizer>,
    extractor: Arc<dyn TableExtractor>,
    config: ConversionConfig,
}

impl Converter {
    pub fn new(
        rasterizer: Arc<dyn Rasterizer>,
        extractor: Arc<dyn TableExtractor>,
        config: ConversionConfig,
    ) -> Self {
        Self {
            rasterizer,
            extractor,
            config,
        }
    }

    /// pdfium rasteriser plus a vision extractor resolved from `config`.
    ///
    /// Fails with [`Pdf2XlsxError::ProviderNotConfigured`] when no inference
    /// credential can be found.
    pub fn from_config(config: ConversionConfig) -> Result<Self, Pdf2XlsxError> {
        let extractor = VisionTableExtractor::from_config(&config)?;
        let rasterizer = PdfiumRasterizer::new(&config);
        Ok(Self::new(Arc::new(rasterizer), Arc::new(extractor), config))
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Convert an in-memory PDF.
    ///
    /// Returns `Err` only for fatal conditions. Pages whose extraction fails
    /// are counted in `stats.failed_pages` and otherwise skipped.
    pub async fn convert_bytes(
        &self,
        pdf: Bytes,
        progress: &dyn ConversionProgressCallback,
    ) -> Result<ConversionOutput, Pdf2XlsxError> {
        let total_start = Instant::now();
        let locale = self.config.locale;
        input::ensure_pdf(&pdf, "upload")?;

        // ── Open ─────────────────────────────────────────────────────────
        progress.on_progress(RASTERIZE_PERCENT, locale.rasterizing());
        let open_start = Instant::now();
        let mut document = self.rasterizer.rasterize(pdf).await?;
        let mut render_time = open_start.elapsed();

        let selected = document.selected;
        let total_pages = document.total_pages.unwrap_or(selected);
        if selected == 0 {
            if total_pages > 0 {
                return Err(Pdf2XlsxError::InvalidConfig(format!(
                    "page selection matches none of the document's {total_pages} pages"
                )));
            }
            warn!("Document has no pages");
            return Err(Pdf2XlsxError::NoTableFound);
        }
        info!("Opened document: {}/{} pages selected", selected, total_pages);

        // Percent is computed over the pages actually processed; an unknown
        // document length falls back to the capped estimate.
        let schedule_total = document.total_pages.map(|_| selected);
        progress.on_conversion_start(schedule_total);

        // ── Render + extract + merge, one page at a time ─────────────────
        let mut llm_time = Duration::ZERO;
        let mut merger = RowMerger::new();
        let mut pages_with_table = 0;
        let mut failed_pages = 0;
        let mut position = 0;

        loop {
            let wait = Instant::now();
            let Some(page) = document.next_page().await else {
                break;
            };
            render_time += wait.elapsed();
            let (idx, image) = page?;
            position += 1;

            let page_num = idx + 1;
            progress.on_page_start(page_num, schedule_total);
            progress.on_progress(
                page_percent(position, schedule_total),
                &locale.processing_page(position, schedule_total),
            );

            let call = Instant::now();
            let extraction = self
                .extractor
                .extract(&image, page_num, merger.is_empty())
                .await;
            llm_time += call.elapsed();

            match extraction {
                TableExtraction::Table(rows) => {
                    pages_with_table += 1;
                    let added = merger.push_page(&rows);
                    debug!("Page {}: {} rows returned, {} kept", page_num, rows.len(), added);
                    progress.on_page_complete(page_num, schedule_total, added);
                }
                other => {
                    if matches!(
                        other,
                        TableExtraction::Failed(_) | TableExtraction::Malformed(_)
                    ) {
                        failed_pages += 1;
                    }
                    let reason = other.reason();
                    debug!("Page {}: {}", page_num, reason);
                    progress.on_page_empty(page_num, schedule_total, &reason);
                }
            }
        }
        if position < selected {
            return Err(Pdf2XlsxError::Internal(format!(
                "rendering stopped after {position} of {selected} pages"
            )));
        }
        let render_duration_ms = render_time.as_millis() as u64;
        let llm_duration_ms = llm_time.as_millis() as u64;

        let rows = merger.finish().inspect_err(|_| {
            info!("No table found on any of {} pages", selected);
            progress.on_progress(DONE_PERCENT, locale.no_table());
        })?;

        // ── Workbook ─────────────────────────────────────────────────────
        progress.on_progress(BUILD_PERCENT, locale.building_workbook());
        let workbook =
            workbook::assemble(rows.clone(), self.config.sheet_name().to_string()).await?;

        let stats = ConversionStats {
            total_pages,
            processed_pages: selected,
            pages_with_table,
            failed_pages,
            row_count: rows.len(),
            column_count: rows.iter().map(Vec::len).max().unwrap_or(0),
            render_duration_ms,
            llm_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };

        info!(
            "Conversion complete: {} rows × {} cols from {}/{} pages, {}ms total",
            stats.row_count,
            stats.column_count,
            stats.pages_with_table,
            stats.processed_pages,
            stats.total_duration_ms
        );

        progress.on_progress(DONE_PERCENT, locale.done());
        progress.on_conversion_complete(stats.row_count);

        Ok(ConversionOutput {
            workbook,
            rows,
            stats,
        })
    }

    /// Convert a local path or HTTP/HTTPS URL.
    pub async fn convert_input(
        &self,
        input_str: &str,
        progress: &dyn ConversionProgressCallback,
    ) -> Result<ConversionOutput, Pdf2XlsxError> {
        info!("Starting conversion: {}", input_str);
        let loaded = input::load_input(input_str, self.config.download_timeout_secs).await?;
        debug!("Loaded '{}' ({} bytes)", loaded.name, loaded.bytes.len());
        self.convert_bytes(loaded.bytes, progress).await
    }

    /// Convert and write the workbook to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) so a failed run never leaves a
    /// partial workbook behind.
    pub async fn convert_to_file(
        &self,
        input_str: &str,
        output_path: &Path,
        progress: &dyn ConversionProgressCallback,
    ) -> Result<ConversionOutput, Pdf2XlsxError> {
        let output = self.convert_input(input_str, progress).await?;
        write_atomic(output_path, &output.workbook).await?;
        info!("Wrote {} ({} bytes)", output_path.display(), output.workbook.len());
        Ok(output)
    }
}

/// Convert a PDF file or URL with a provider resolved from `config`.
///
/// # Example
/// ```rust,no_run
/// use pdf2xlsx::{convert, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let output = convert("statement.pdf", &ConversionConfig::default()).await?;
/// std::fs::write("statement.xlsx", &output.workbook)?;
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2XlsxError> {
    Converter::from_config(config.clone())?
        .convert_input(input_str.as_ref(), &NoopProgressCallback)
        .await
}

/// Convert a PDF file or URL and write the workbook to `output_path`.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, Pdf2XlsxError> {
    let output = Converter::from_config(config.clone())?
        .convert_to_file(input_str.as_ref(), output_path.as_ref(), &NoopProgressCallback)
        .await?;
    Ok(output.stats)
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Pdf2XlsxError> {
    let write_err = |source| Pdf2XlsxError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("xlsx.tmp");
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageError;
    use crate::pipeline::render::RenderedDocument;
    use async_trait::async_trait;
    use image::DynamicImage;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    const PDF: &[u8] = b"%PDF-1.7\n%%EOF";

    struct BlankPages(usize);

    #[async_trait]
    impl Rasterizer for BlankPages {
        async fn rasterize(&self, _pdf: Bytes) -> Result<RenderedDocument, Pdf2XlsxError> {
            Ok(RenderedDocument::from_images(
                Some(self.0),
                (0..self.0).map(|i| (i, DynamicImage::new_rgb8(4, 4))).collect(),
            ))
        }
    }

    /// Replays one scripted outcome per page and records the first-page flag.
    struct Scripted {
        pages: Vec<TableExtraction>,
        first_flags: Mutex<Vec<bool>>,
    }

    impl Scripted {
        fn new(pages: Vec<TableExtraction>) -> Self {
            Self {
                pages,
                first_flags: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TableExtractor for Scripted {
        async fn extract(&self, _: &DynamicImage, page_num: usize, first: bool) -> TableExtraction {
            self.first_flags.lock().unwrap().push(first);
            self.pages[page_num - 1].clone()
        }
    }

    fn table(v: Value) -> TableExtraction {
        TableExtraction::Table(v.as_array().cloned().unwrap())
    }

    fn converter(pages: Vec<TableExtraction>) -> (Converter, Arc<Scripted>) {
        let extractor = Arc::new(Scripted::new(pages));
        let n = extractor.pages.len();
        let conv = Converter::new(
            Arc::new(BlankPages(n)),
            extractor.clone(),
            ConversionConfig::default(),
        );
        (conv, extractor)
    }

    #[derive(Default)]
    struct Percent(Mutex<Vec<u8>>);

    impl ConversionProgressCallback for Percent {
        fn on_progress(&self, percent: u8, _message: &str) {
            self.0.lock().unwrap().push(percent);
        }
    }

    #[tokio::test]
    async fn header_flag_follows_accumulated_rows() {
        let (conv, ext) = converter(vec![
            TableExtraction::Empty,
            table(json!([["h1", "h2"], ["a", "b"]])),
            table(json!([["c", "d"]])),
        ]);
        let out = conv
            .convert_bytes(Bytes::from_static(PDF), &NoopProgressCallback)
            .await
            .unwrap();
        assert_eq!(*ext.first_flags.lock().unwrap(), vec![true, true, false]);
        assert_eq!(out.stats.row_count, 3);
        assert_eq!(out.stats.pages_with_table, 2);
    }

    #[tokio::test]
    async fn failed_pages_are_counted_not_fatal() {
        let (conv, _) = converter(vec![
            TableExtraction::Failed(PageError::Timeout { page: 1, secs: 1 }),
            table(json!([["x"]])),
            TableExtraction::Malformed("junk".into()),
        ]);
        let out = conv
            .convert_bytes(Bytes::from_static(PDF), &NoopProgressCallback)
            .await
            .unwrap();
        assert_eq!(out.stats.failed_pages, 2);
        assert_eq!(out.rows, vec![vec!["x".to_string()]]);
        assert!(out.workbook.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_ends_at_100() {
        let (conv, _) = converter(vec![
            table(json!([["h"], ["1"]])),
            table(json!([["2"]])),
            table(json!([["3"]])),
        ]);
        let rec = Percent::default();
        conv.convert_bytes(Bytes::from_static(PDF), &rec).await.unwrap();
        let seen = rec.0.into_inner().unwrap();
        assert_eq!(seen.first(), Some(&RASTERIZE_PERCENT));
        assert_eq!(seen.last(), Some(&DONE_PERCENT));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    }

    #[derive(Default)]
    struct Steps(Mutex<Vec<(u8, String)>>);

    impl ConversionProgressCallback for Steps {
        fn on_progress(&self, percent: u8, message: &str) {
            self.0.lock().unwrap().push((percent, message.to_string()));
        }
    }

    #[tokio::test]
    async fn all_empty_pages_fail_without_building_a_workbook() {
        let (conv, _) = converter(vec![TableExtraction::Empty, TableExtraction::Empty]);
        let rec = Steps::default();
        let err = conv
            .convert_bytes(Bytes::from_static(PDF), &rec)
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::NoTableFound));

        let steps = rec.0.into_inner().unwrap();
        assert!(steps.iter().all(|(p, _)| *p != BUILD_PERCENT), "{steps:?}");
        let (percent, message) = steps.last().unwrap();
        assert_eq!(*percent, DONE_PERCENT);
        assert_eq!(message, conv.config().locale.no_table());
    }

    /// Announces `selected` pages but only delivers `sent`, optionally
    /// followed by a render failure for the next page.
    struct ShortPages {
        selected: usize,
        sent: usize,
        fail_next: bool,
    }

    #[async_trait]
    impl Rasterizer for ShortPages {
        async fn rasterize(&self, _pdf: Bytes) -> Result<RenderedDocument, Pdf2XlsxError> {
            let (tx, rx) = tokio::sync::mpsc::channel(self.selected);
            for i in 0..self.sent {
                tx.try_send(Ok((i, DynamicImage::new_rgb8(4, 4)))).unwrap();
            }
            if self.fail_next {
                tx.try_send(Err(Pdf2XlsxError::RasterisationFailed {
                    page: self.sent + 1,
                    detail: "bad xref".into(),
                }))
                .unwrap();
            }
            Ok(RenderedDocument::new(Some(self.selected), self.selected, rx))
        }
    }

    fn short_converter(rasterizer: ShortPages) -> (Converter, Arc<Scripted>) {
        let extractor = Arc::new(Scripted::new(vec![
            table(json!([["h"], ["1"]]));
            rasterizer.selected
        ]));
        let conv = Converter::new(
            Arc::new(rasterizer),
            extractor.clone(),
            ConversionConfig::default(),
        );
        (conv, extractor)
    }

    #[tokio::test]
    async fn page_render_failure_aborts_conversion() {
        let (conv, ext) = short_converter(ShortPages {
            selected: 3,
            sent: 1,
            fail_next: true,
        });
        let err = conv
            .convert_bytes(Bytes::from_static(PDF), &NoopProgressCallback)
            .await
            .unwrap_err();
        assert!(
            matches!(err, Pdf2XlsxError::RasterisationFailed { page: 2, .. }),
            "{err:?}"
        );
        // Page 1 was extracted before page 2 failed to render.
        assert_eq!(*ext.first_flags.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn renderer_stopping_early_is_an_internal_error() {
        let (conv, _) = short_converter(ShortPages {
            selected: 3,
            sent: 2,
            fail_next: false,
        });
        let rec = Percent::default();
        let err = conv
            .convert_bytes(Bytes::from_static(PDF), &rec)
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::Internal(_)), "{err:?}");
        assert!(!rec.0.lock().unwrap().contains(&BUILD_PERCENT));
    }

    #[tokio::test]
    async fn non_pdf_bytes_are_rejected_before_rendering() {
        let (conv, ext) = converter(vec![table(json!([["x"]]))]);
        let err = conv
            .convert_bytes(Bytes::from_static(b"GIF89a"), &NoopProgressCallback)
            .await
            .unwrap_err();
        assert!(err.is_input_error());
        assert!(ext.first_flags.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.xlsx");
        write_atomic(&path, b"PK\x03\x04").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"PK\x03\x04");
        assert!(!path.with_extension("xlsx.tmp").exists());
    }
}
