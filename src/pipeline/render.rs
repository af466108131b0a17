//! PDF rasterisation: render selected pages to `DynamicImage` via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which uses thread-local
//! state internally and is CPU-bound. `tokio::task::spawn_blocking` moves the
//! work onto the blocking pool so the Tokio workers keep serving requests
//! and progress streams while a large document renders.
//!
//! Pages are handed over one at a time through a bounded channel: the render
//! thread stays at most [`RENDER_AHEAD`] pages ahead of the consumer, so
//! memory does not grow with page count and extraction of page 1 starts as
//! soon as it is rendered.
//!
//! The [`Rasterizer`] trait is the seam the rest of the pipeline sees; tests
//! substitute an in-memory implementation and never need pdfium.

use crate::config::{ConversionConfig, PageSelection};
use crate::error::Pdf2XlsxError;
use async_trait::async_trait;
use bytes::Bytes;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Rendered pages buffered ahead of the consumer.
pub const RENDER_AHEAD: usize = 2;

/// `(page_index_0based, image)`.
pub type PageImage = (usize, DynamicImage);

/// An opened document whose selected pages arrive in order.
#[derive(Debug)]
pub struct RenderedDocument {
    /// Page count of the whole document, when the backend knows it.
    pub total_pages: Option<usize>,
    /// How many pages [`next_page`](Self::next_page) will yield.
    pub selected: usize,
    pages: mpsc::Receiver<Result<PageImage, Pdf2XlsxError>>,
}

impl RenderedDocument {
    /// A document fed by a producer that sends `selected` pages on `pages`.
    pub fn new(
        total_pages: Option<usize>,
        selected: usize,
        pages: mpsc::Receiver<Result<PageImage, Pdf2XlsxError>>,
    ) -> Self {
        Self {
            total_pages,
            selected,
            pages,
        }
    }

    /// A document whose pages are already in memory.
    pub fn from_images(total_pages: Option<usize>, images: Vec<PageImage>) -> Self {
        let selected = images.len();
        let (tx, rx) = mpsc::channel(selected.max(1));
        for page in images {
            // Capacity covers every page.
            let _ = tx.try_send(Ok(page));
        }
        Self::new(total_pages, selected, rx)
    }

    /// The next page in order. `None` once the producer is finished; a
    /// render failure is yielded as `Err` and ends the sequence.
    pub async fn next_page(&mut self) -> Option<Result<PageImage, Pdf2XlsxError>> {
        self.pages.recv().await
    }
}

/// Turns a PDF byte buffer into page images.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Open `pdf`. Load errors (corrupt, password) are returned here;
    /// per-page render errors arrive through the document.
    async fn rasterize(&self, pdf: Bytes) -> Result<RenderedDocument, Pdf2XlsxError>;
}

/// pdfium-backed [`Rasterizer`].
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    dpi: u32,
    max_pixels: u32,
    password: Option<String>,
    pages: PageSelection,
    library: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(config: &ConversionConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
            pages: config.pages.clone(),
            library: config
                .pdfium_library
                .clone()
                .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from)),
        }
    }
}

type Opened = Result<(usize, usize), Pdf2XlsxError>;

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn rasterize(&self, pdf: Bytes) -> Result<RenderedDocument, Pdf2XlsxError> {
        let this = self.clone();
        let (opened_tx, opened_rx) = oneshot::channel();
        let (page_tx, page_rx) = mpsc::channel(RENDER_AHEAD);

        tokio::task::spawn_blocking(move || this.render_blocking(&pdf, opened_tx, page_tx));

        let (total_pages, selected) = opened_rx.await.map_err(|_| {
            Pdf2XlsxError::Internal("Render task ended before opening the document".to_string())
        })??;

        Ok(RenderedDocument::new(Some(total_pages), selected, page_rx))
    }
}

impl PdfiumRasterizer {
    fn render_blocking(
        &self,
        pdf: &[u8],
        opened: oneshot::Sender<Opened>,
        pages_tx: mpsc::Sender<Result<PageImage, Pdf2XlsxError>>,
    ) {
        let pdfium = match bind_pdfium(self.library.as_deref()) {
            Ok(pdfium) => pdfium,
            Err(e) => {
                let _ = opened.send(Err(e));
                return;
            }
        };

        let document = match pdfium.load_pdf_from_byte_slice(pdf, self.password.as_deref()) {
            Ok(document) => document,
            Err(e) => {
                let _ = opened.send(Err(classify_load_error(e, self.password.is_some())));
                return;
            }
        };

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        let indices = self.pages.to_indices(total_pages);
        info!("PDF loaded: {} pages, {} selected", total_pages, indices.len());

        if opened.send(Ok((total_pages, indices.len()))).is_err() {
            return;
        }

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        for idx in indices {
            let rendered = render_page(&pages, idx, &render_config).map(|image| (idx, image));
            let failed = rendered.is_err();
            if pages_tx.blocking_send(rendered).is_err() {
                debug!("Page consumer dropped; stopping render at page {}", idx + 1);
                return;
            }
            if failed {
                return;
            }
        }
    }
}

fn render_page(
    pages: &PdfPages<'_>,
    idx: usize,
    render_config: &PdfRenderConfig,
) -> Result<DynamicImage, Pdf2XlsxError> {
    let page = pages
        .get(idx as u16)
        .map_err(|e| Pdf2XlsxError::RasterisationFailed {
            page: idx + 1,
            detail: format!("{:?}", e),
        })?;

    let bitmap = page.render_with_config(render_config).map_err(|e| {
        Pdf2XlsxError::RasterisationFailed {
            page: idx + 1,
            detail: format!("{:?}", e),
        }
    })?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        idx + 1,
        image.width(),
        image.height()
    );
    Ok(image)
}

fn bind_pdfium(library: Option<&Path>) -> Result<Pdfium, Pdf2XlsxError> {
    let bindings = match library {
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| Pdf2XlsxError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn classify_load_error(e: PdfiumError, had_password: bool) -> Pdf2XlsxError {
    let detail = format!("{:?}", e);
    if detail.to_ascii_lowercase().contains("password") {
        if had_password {
            Pdf2XlsxError::WrongPassword
        } else {
            Pdf2XlsxError::PasswordRequired
        }
    } else {
        Pdf2XlsxError::CorruptPdf { detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(n: usize) -> Vec<PageImage> {
        (0..n).map(|i| (i, DynamicImage::new_rgb8(2, 2))).collect()
    }

    #[tokio::test]
    async fn in_memory_pages_arrive_in_order_then_end() {
        let mut doc = RenderedDocument::from_images(Some(5), blank(3));
        assert_eq!(doc.selected, 3);

        let mut seen = Vec::new();
        while let Some(page) = doc.next_page().await {
            seen.push(page.unwrap().0);
        }
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn empty_document_ends_immediately() {
        let mut doc = RenderedDocument::from_images(Some(0), Vec::new());
        assert_eq!(doc.selected, 0);
        assert!(doc.next_page().await.is_none());
    }

    #[tokio::test]
    async fn producer_stays_bounded_ahead_of_consumer() {
        let (tx, rx) = mpsc::channel(RENDER_AHEAD);
        let mut doc = RenderedDocument::new(Some(10), 10, rx);

        let producer = tokio::task::spawn_blocking(move || {
            let mut sent = 0;
            for page in blank(10) {
                if tx.blocking_send(Ok(page)).is_err() {
                    break;
                }
                sent += 1;
            }
            sent
        });

        assert_eq!(doc.next_page().await.unwrap().unwrap().0, 0);
        drop(doc);
        let sent = producer.await.unwrap();
        assert!(sent <= 1 + RENDER_AHEAD + 1, "sent {sent} pages");
    }
}
