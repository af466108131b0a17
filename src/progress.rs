//! Progress-callback trait and the percent schedule of a conversion.
//!
//! The conversion pipeline reports through a [`ConversionProgressCallback`].
//! The background job runner forwards `on_progress` into the job store; the
//! CLI drives an indicatif bar from the per-page hooks. The library knows
//! nothing about either.
//!
//! # Percent schedule
//!
//! | Stage                | Percent                                    |
//! |----------------------|--------------------------------------------|
//! | rasterising          | 5                                          |
//! | page *n* of *total*  | 10 + n / total × 75                        |
//! | page *n*, total unknown | 10 + min(n × 6, 75)                     |
//! | building workbook    | 90                                         |
//! | done                 | 100                                        |

use std::sync::Arc;

pub const RASTERIZE_PERCENT: u8 = 5;
pub const PAGES_BASE_PERCENT: f64 = 10.0;
pub const PAGES_SPAN_PERCENT: f64 = 75.0;
/// Per-page increment used when the page count is unknown.
pub const UNKNOWN_TOTAL_STEP: f64 = 6.0;
pub const BUILD_PERCENT: u8 = 90;
pub const DONE_PERCENT: u8 = 100;

/// Round and clamp a raw percentage into `0..=100`.
pub fn clamp_percent(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

/// Percent reported when page `page_num` (1-indexed) starts processing.
pub fn page_percent(page_num: usize, total_pages: Option<usize>) -> u8 {
    let share = match total_pages {
        Some(total) if total > 0 => page_num as f64 / total as f64 * PAGES_SPAN_PERCENT,
        _ => (page_num as f64 * UNKNOWN_TOTAL_STEP).min(PAGES_SPAN_PERCENT),
    };
    clamp_percent(PAGES_BASE_PERCENT + share)
}

/// Called by the conversion pipeline as it processes a document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Pages are processed strictly in order, but a
/// callback may be shared across concurrently running conversions.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once the PDF has been rasterised.
    fn on_conversion_start(&self, total_pages: Option<usize>) {
        let _ = total_pages;
    }

    /// Called just before the VLM request is sent for a page.
    fn on_page_start(&self, page_num: usize, total_pages: Option<usize>) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page yielded a table.
    ///
    /// `rows_added` counts rows that survived blank/header filtering.
    fn on_page_complete(&self, page_num: usize, total_pages: Option<usize>, rows_added: usize) {
        let _ = (page_num, total_pages, rows_added);
    }

    /// Called when a page yielded no table (including recovered failures).
    fn on_page_empty(&self, page_num: usize, total_pages: Option<usize>, reason: &str) {
        let _ = (page_num, total_pages, reason);
    }

    /// Overall percent and a user-facing message for the current step.
    fn on_progress(&self, percent: u8, message: &str) {
        let _ = (percent, message);
    }

    /// Called once the workbook has been produced.
    fn on_conversion_complete(&self, row_count: usize) {
        let _ = row_count;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias for a shared callback.
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
