//! # pdf2xlsx
//!
//! Extract tables from PDF documents into Excel workbooks using Vision
//! Language Models (VLMs).
//!
//! Table layouts in PDFs rarely survive text extraction: ruled cells,
//! wrapped lines and repeated page headers come out as an unordered stream
//! of words. This crate rasterises each page instead, asks a vision model to
//! read the table on it as JSON, merges the per-page fragments into one
//! table and writes it to a formatted `.xlsx`.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     local file, URL download, or upload bytes
//!  ├─ 2. Render    rasterise pages via pdfium (spawn_blocking)
//!  ├─ 3. Extract   one VLM call per page → TableExtraction
//!  ├─ 4. Merge     drop blank rows and repeated headers, normalise cells
//!  └─ 5. Workbook  styled single sheet, frozen header row
//! ```
//!
//! Pages go through steps 3–4 one at a time. A page whose call fails or
//! whose answer cannot be decoded is treated as having no table; only a
//! document with no table on any page fails.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2xlsx::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / EDGEQUAKE_LLM_PROVIDER / …
//!     let config = ConversionConfig::default();
//!     let output = convert("statement.pdf", &config).await?;
//!     std::fs::write("statement.xlsx", &output.workbook)?;
//!     eprintln!("{} rows from {} pages", output.stats.row_count, output.stats.processed_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Background jobs
//!
//! The [`server`] module exposes the pipeline over HTTP. An upload creates a
//! [`jobs::Job`] and returns its id at once; [`runner::spawn_job`] converts
//! in the background, [`stream::progress_stream`] reports progress, and the
//! finished workbook is downloaded by id. Jobs live in memory and expire
//! after a retention window.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2xlsx` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ```toml
//! pdf2xlsx = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod jobs;
pub mod messages;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod runner;
pub mod server;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, PageSelection, ServerConfig};
pub use convert::{convert, convert_to_file, Converter};
pub use error::{PageError, Pdf2XlsxError};
pub use jobs::{Job, JobId, JobStatus, JobStore};
pub use messages::Locale;
pub use output::{ConversionOutput, ConversionStats, TableMatrix};
pub use pipeline::extract::{TableExtraction, TableExtractor};
pub use pipeline::render::{PageImage, Rasterizer, RenderedDocument};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
