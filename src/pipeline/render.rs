//! PDF rasterisation: render every page of an uploaded worksheet to PNG via
//! pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread designed for blocking operations, preventing the Tokio worker
//! threads from stalling during CPU-heavy rendering.
//!
//! ## Why cap pixels, not DPI?
//!
//! Page sizes vary wildly: an A0 poster at 150 DPI would produce a
//! 12,000 × 17,000 px image. `pdf_max_pixels` caps the longest edge
//! regardless of physical size, keeping memory bounded and staying well
//! inside the OCR provider's request size limit.

use crate::config::ServerConfig;
use crate::error::{OcrError, PageError};
use crate::pipeline::encode::encode_page;
use async_trait::async_trait;
use bytes::Bytes;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// One rendered page, or the reason it could not be rendered.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 1-based page number.
    pub page_num: usize,
    pub png: Result<Bytes, PageError>,
}

/// Turns PDF bytes into per-page PNG images, in page order.
///
/// `Err` means the document as a whole could not be opened; a single bad
/// page is reported inside its [`RenderedPage`].
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize(&self, pdf: Bytes) -> Result<Vec<RenderedPage>, OcrError>;
}

/// [`PageRasterizer`] backed by the pdfium shared library.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
    max_pixels: u32,
    max_pages: usize,
}

impl PdfiumRasterizer {
    pub fn new(library_path: Option<PathBuf>, max_pixels: u32, max_pages: usize) -> Self {
        Self {
            library_path,
            max_pixels,
            max_pages,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.pdfium_library_path.clone(),
            config.pdf_max_pixels,
            config.pdf_max_pages,
        )
    }
}

#[async_trait]
impl PageRasterizer for PdfiumRasterizer {
    async fn rasterize(&self, pdf: Bytes) -> Result<Vec<RenderedPage>, OcrError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.rasterize_blocking(&pdf))
            .await
            .map_err(|e| OcrError::Internal(format!("Render task panicked: {}", e)))?
    }
}

impl PdfiumRasterizer {
    fn bind(&self) -> Result<Pdfium, OcrError> {
        let bindings = match &self.library_path {
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| OcrError::Document(format!("pdfium library unavailable: {:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }

    /// Blocking implementation of page rendering.
    fn rasterize_blocking(&self, pdf: &[u8]) -> Result<Vec<RenderedPage>, OcrError> {
        let pdfium = self.bind()?;

        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| OcrError::Document(format!("{:?}", e)))?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);

        if total_pages > self.max_pages {
            warn!(
                "Document has {} pages; only the first {} are processed",
                total_pages, self.max_pages
            );
        }

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let mut results = Vec::with_capacity(total_pages.min(self.max_pages));

        for idx in 0..total_pages.min(self.max_pages) {
            let page_num = idx + 1;
            let png = render_one(pages, idx, &render_config).map_err(|detail| {
                PageError::RenderFailed {
                    page: page_num,
                    detail,
                }
            });
            results.push(RenderedPage { page_num, png });
        }

        Ok(results)
    }
}

/// Render and PNG-encode a single page.
fn render_one(
    pages: &PdfPages,
    idx: usize,
    render_config: &PdfRenderConfig,
) -> Result<Bytes, String> {
    let page = pages.get(idx as u16).map_err(|e| format!("{:?}", e))?;
    let bitmap = page
        .render_with_config(render_config)
        .map_err(|e| format!("{:?}", e))?;
    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        idx + 1,
        image.width(),
        image.height()
    );
    encode_page(&image).map_err(|e| e.to_string())
}
