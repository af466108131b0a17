mod convert;
mod download;
mod health;
mod progress;
mod start;

pub use convert::convert_handler;
pub use download::download_handler;
pub use health::health_handler;
pub use progress::progress_handler;
pub use start::start_handler;

use axum::extract::Multipart;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::messages::Locale;
use crate::pipeline::input::{ensure_pdf, is_pdf_content_type};

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// `?jobId=` query string shared by progress and download.
#[derive(Debug, Deserialize)]
pub struct JobQuery {
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

impl JobQuery {
    /// The non-empty raw `jobId`, if any.
    pub fn raw(&self) -> Option<&str> {
        self.job_id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// The `file` part of a multipart upload, checked to be a PDF.
#[derive(Debug)]
pub struct PdfUpload {
    pub filename: String,
    pub bytes: Bytes,
}

/// Pull the `file` part out of `multipart`. The error side is the response
/// to send back.
pub async fn read_pdf_upload(
    mut multipart: Multipart,
    locale: Locale,
) -> Result<PdfUpload, Response> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => {
                tracing::warn!("Upload without a file part");
                return Err(error_response(StatusCode::BAD_REQUEST, locale.no_file()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read multipart");
                return Err(error_response(e.status(), e.body_text()));
            }
        };

        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("document.pdf").to_string();
        let content_type = field.content_type().unwrap_or("").to_string();
        if !is_pdf_content_type(&content_type) {
            tracing::warn!(content_type = %content_type, "Rejected non-PDF upload");
            return Err(error_response(StatusCode::BAD_REQUEST, locale.not_a_pdf()));
        }

        let bytes = field.bytes().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to read file bytes");
            error_response(e.status(), e.body_text())
        })?;

        if let Err(e) = ensure_pdf(&bytes, &filename) {
            tracing::warn!(error = %e, "Upload is not a PDF");
            return Err(error_response(StatusCode::BAD_REQUEST, locale.not_a_pdf()));
        }

        tracing::debug!(filename = %filename, bytes = bytes.len(), "PDF upload received");
        return Ok(PdfUpload { filename, bytes });
    }
}

/// 200 response carrying a workbook as an attachment.
pub fn xlsx_response(workbook: Bytes, filename: &str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, XLSX_MIME.to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(filename)),
        ],
        workbook,
    )
        .into_response()
}

/// `attachment` disposition. Non-ASCII names get an ASCII fallback plus an
/// RFC 5987 `filename*`.
pub fn content_disposition(filename: &str) -> String {
    let plain = filename
        .chars()
        .all(|c| (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\');
    if plain {
        return format!("attachment; filename=\"{filename}\"");
    }

    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        percent_encode(filename)
    )
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
