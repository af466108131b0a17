//! Error types for the pdf2xlsx library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2XlsxError`]: **Fatal.** The conversion cannot produce a workbook
//!   (not a PDF, wrong password, provider not configured, no table on any
//!   page). Returned as `Err(Pdf2XlsxError)` from the `convert*` functions
//!   and recorded on the job when the conversion runs in the background.
//!
//! * [`PageError`]: **Non-fatal.** A single page's inference call failed.
//!   The page is treated as having no table and the remaining pages are still
//!   processed.

use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2xlsx library.
#[derive(Debug, Error)]
pub enum Pdf2XlsxError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("'{name}' is not a valid PDF (first bytes: {magic:?})")]
    NotAPdf { name: String, magic: Vec<u8> },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}")]
    CorruptPdf { detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for encrypted PDF")]
    WrongPassword,

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// No vision provider could be resolved (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured: {hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Extraction outcome ────────────────────────────────────────────────
    /// Every page came back without a usable table.
    #[error("No table found in the PDF: the vision model could not identify a table on any page")]
    NoTableFound,

    // ── Output errors ─────────────────────────────────────────────────────
    /// The spreadsheet writer rejected the merged rows.
    #[error("Failed to build workbook: {0}")]
    WorkbookFailed(String),

    /// Could not create or write the output workbook file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a panicked worker task).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2XlsxError {
    /// Whether the error was caused by what the caller sent rather than by
    /// the pipeline.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Pdf2XlsxError::FileNotFound { .. }
                | Pdf2XlsxError::PermissionDenied { .. }
                | Pdf2XlsxError::NotAPdf { .. }
                | Pdf2XlsxError::CorruptPdf { .. }
                | Pdf2XlsxError::PasswordRequired
                | Pdf2XlsxError::WrongPassword
        )
    }

    /// HTTP status used when the error is reported synchronously.
    pub fn http_status(&self) -> StatusCode {
        if self.is_input_error() {
            StatusCode::BAD_REQUEST
        } else if matches!(self, Pdf2XlsxError::NoTableFound) {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// A non-fatal error for a single page.
///
/// The page contributes no rows; the conversion continues.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The inference call returned an error (network, auth, rate limit…).
    #[error("Page {page}: LLM call failed: {detail}")]
    LlmFailed { page: usize, detail: String },

    /// The inference call did not finish in time.
    #[error("Page {page}: LLM call timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// The rendered page could not be encoded for upload.
    #[error("Page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_table_maps_to_not_found() {
        assert_eq!(Pdf2XlsxError::NoTableFound.http_status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn input_errors_map_to_bad_request() {
        let e = Pdf2XlsxError::NotAPdf {
            name: "notes.txt".into(),
            magic: b"hell".to_vec(),
        };
        assert!(e.is_input_error());
        assert_eq!(e.http_status(), StatusCode::BAD_REQUEST);
        assert!(e.to_string().contains("notes.txt"));
    }

    #[test]
    fn provider_errors_map_to_internal() {
        let e = Pdf2XlsxError::ProviderNotConfigured {
            provider: "auto".into(),
            hint: "set OPENAI_API_KEY".into(),
        };
        assert!(!e.is_input_error());
        assert_eq!(e.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(e.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn page_timeout_display() {
        let e = PageError::Timeout { page: 3, secs: 120 };
        assert!(e.to_string().contains("Page 3"));
        assert!(e.to_string().contains("120s"));
    }
}
