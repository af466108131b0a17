//! Input resolution: load a user-supplied path or URL into memory.
//!
//! pdfium can open a PDF straight from a byte slice, so unlike a file-based
//! pipeline nothing is staged on disk: local files are read, URLs are
//! downloaded, and uploads arrive as bytes already. Every path goes through
//! [`ensure_pdf`] so callers get a meaningful error rather than a pdfium
//! failure.

use crate::error::Pdf2XlsxError;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A PDF held in memory together with the name it arrived under.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    pub bytes: Bytes,
    /// Original file name, used to derive the output name.
    pub name: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Reject anything that does not start with the `%PDF` magic bytes.
pub fn ensure_pdf(bytes: &[u8], name: &str) -> Result<(), Pdf2XlsxError> {
    if bytes.starts_with(b"%PDF") {
        Ok(())
    } else {
        Err(Pdf2XlsxError::NotAPdf {
            name: name.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        })
    }
}

/// Whether an upload's declared content type names a PDF.
pub fn is_pdf_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("pdf")
}

/// Load a local path or HTTP/HTTPS URL.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<LoadedInput, Pdf2XlsxError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        load_local(Path::new(input)).await
    }
}

async fn load_local(path: &Path) -> Result<LoadedInput, Pdf2XlsxError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => Pdf2XlsxError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Pdf2XlsxError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let name = file_name_of(path);
    ensure_pdf(&bytes, &name)?;
    debug!("Loaded local PDF: {} ({} bytes)", path.display(), bytes.len());

    Ok(LoadedInput {
        bytes: Bytes::from(bytes),
        name,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<LoadedInput, Pdf2XlsxError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Pdf2XlsxError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2XlsxError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Pdf2XlsxError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(Pdf2XlsxError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Pdf2XlsxError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let name = filename_from_url(url);
    ensure_pdf(&bytes, &name)?;
    info!("Downloaded {} bytes as '{}'", bytes.len(), name);

    Ok(LoadedInput { bytes, name })
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string())
}

/// Last non-empty URL path segment that looks like a file name.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

/// Default output path next to the input: `.pdf` swapped for `.xlsx`.
pub fn default_output_path(input: &str) -> PathBuf {
    let name = if is_url(input) {
        filename_from_url(input)
    } else {
        input.to_string()
    };
    PathBuf::from(crate::output::output_filename(&name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn magic_bytes_checked() {
        assert!(ensure_pdf(b"%PDF-1.7\n...", "a.pdf").is_ok());
        let err = ensure_pdf(b"PK\x03\x04", "a.zip").unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::NotAPdf { ref magic, .. } if magic == b"PK\x03\x04"));
        assert!(ensure_pdf(b"", "empty.pdf").is_err());
    }

    #[test]
    fn content_type_check_is_loose() {
        assert!(is_pdf_content_type("application/pdf"));
        assert!(is_pdf_content_type("application/x-PDF"));
        assert!(!is_pdf_content_type("image/png"));
    }

    #[test]
    fn url_filename_extraction() {
        assert_eq!(filename_from_url("https://x.org/files/q3.pdf"), "q3.pdf");
        assert_eq!(filename_from_url("https://x.org/files/"), "downloaded.pdf");
        assert_eq!(filename_from_url("not a url"), "downloaded.pdf");
    }

    #[test]
    fn default_output_path_swaps_extension() {
        assert_eq!(default_output_path("in/report.pdf"), PathBuf::from("in/report.xlsx"));
        assert_eq!(
            default_output_path("https://x.org/a/b.PDF"),
            PathBuf::from("b.xlsx")
        );
    }

    #[tokio::test]
    async fn missing_local_file_is_not_found() {
        let err = load_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn local_non_pdf_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"hello world").unwrap();
        let err = load_input(path.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::NotAPdf { .. }));
    }

    #[tokio::test]
    async fn local_pdf_is_loaded_with_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%%EOF").unwrap();
        let loaded = load_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(loaded.name, "invoice.pdf");
        assert!(loaded.bytes.starts_with(b"%PDF"));
    }
}
