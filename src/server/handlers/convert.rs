use axum::extract::{Multipart, State};
use axum::response::Response;
use bytes::Bytes;

use super::{error_response, read_pdf_upload, xlsx_response};
use crate::error::Pdf2XlsxError;
use crate::output::output_filename;
use crate::progress::NoopProgressCallback;
use crate::server::state::AppState;

/// Legacy synchronous endpoint: the whole pipeline inside one request.
///
/// 400 bad input, 404 no table found, 500 anything else.
#[tracing::instrument(skip(state, multipart))]
pub async fn convert_handler(State(state): State<AppState>, multipart: Multipart) -> Response {
    let upload = match read_pdf_upload(multipart, state.locale).await {
        Ok(upload) => upload,
        Err(response) => return response,
    };

    let result = match state.converter() {
        Ok(converter) => {
            converter
                .convert_bytes(upload.bytes, &NoopProgressCallback)
                .await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(output) => xlsx_response(
            Bytes::from(output.workbook),
            &output_filename(&upload.filename),
        ),
        Err(e) => {
            let status = e.http_status();
            tracing::warn!(error = %e, status = %status, "Synchronous conversion failed");
            let message = match e {
                Pdf2XlsxError::NoTableFound => state.locale.no_table_error().to_string(),
                Pdf2XlsxError::ProviderNotConfigured { .. } => {
                    state.locale.provider_not_configured().to_string()
                }
                other => other.to_string(),
            };
            error_response(status, message)
        }
    }
}
