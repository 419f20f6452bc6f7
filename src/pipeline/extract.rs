//! Text extraction: turn an [`UploadPayload`] into plain text.
//!
//! Images go straight to the OCR collaborator. PDFs are rasterised page by
//! page and each page is OCR'd separately; the page texts are joined with a
//! blank line ([`PAGE_SEPARATOR`]).
//!
//! ## Page failures
//!
//! A page that fails to render or OCR contributes empty text and the rest of
//! the document continues. Only when *every* page fails is the document
//! reported as failed, carrying the first page's error for the logs. A PDF
//! with zero pages yields empty text, which the orchestrator treats as
//! "nothing readable".

use crate::clients::TextDetector;
use crate::error::{OcrError, PageError};
use crate::payload::{MediaKind, UploadPayload};
use crate::pipeline::render::{PageRasterizer, RenderedPage};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Joins per-page OCR text.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// OCR adapter for images and multi-page PDFs.
#[derive(Clone)]
pub struct TextExtractor {
    ocr: Arc<dyn TextDetector>,
    rasterizer: Arc<dyn PageRasterizer>,
    page_concurrency: usize,
}

impl TextExtractor {
    pub fn new(
        ocr: Arc<dyn TextDetector>,
        rasterizer: Arc<dyn PageRasterizer>,
        page_concurrency: usize,
    ) -> Self {
        Self {
            ocr,
            rasterizer,
            page_concurrency: page_concurrency.max(1),
        }
    }

    /// `false` when the OCR collaborator has no credentials.
    pub fn is_ready(&self) -> bool {
        self.ocr.is_ready()
    }

    /// Extract text from an image or PDF. Never returns `None`; empty text
    /// means nothing was recognised.
    pub async fn extract_text(&self, payload: &UploadPayload) -> Result<String, OcrError> {
        let start = Instant::now();
        let text = match payload.kind {
            MediaKind::Png | MediaKind::Jpeg => {
                let response = self.ocr.detect_text(payload.bytes.clone()).await?;
                response.full_text().to_string()
            }
            MediaKind::Pdf => self.extract_pdf(payload).await?,
        };
        info!(
            "Extracted {} chars from {} upload in {:?}",
            text.len(),
            payload.kind.mime_type(),
            start.elapsed()
        );
        Ok(text)
    }

    async fn extract_pdf(&self, payload: &UploadPayload) -> Result<String, OcrError> {
        let pages = self.rasterizer.rasterize(payload.bytes.clone()).await?;
        if pages.is_empty() {
            warn!("PDF has no pages");
            return Ok(String::new());
        }
        let total = pages.len();

        // `buffered` keeps results in page order while running up to
        // `page_concurrency` OCR calls at once.
        let results: Vec<Result<String, PageError>> = stream::iter(pages)
            .map(|page| self.ocr_page(page))
            .buffered(self.page_concurrency)
            .collect()
            .await;

        let mut first_error: Option<PageError> = None;
        let mut failed = 0usize;
        let mut texts = Vec::with_capacity(total);
        for result in results {
            match result {
                Ok(text) => texts.push(text),
                Err(e) => {
                    warn!("{} (page blanked)", e);
                    failed += 1;
                    first_error.get_or_insert(e);
                    texts.push(String::new());
                }
            }
        }
        debug!("PDF OCR: {} pages, {} failed", total, failed);

        if failed == total {
            if let Some(e) = first_error {
                return Err(OcrError::AllPagesFailed {
                    total,
                    first_error: e.to_string(),
                });
            }
        }

        Ok(texts.join(PAGE_SEPARATOR))
    }

    async fn ocr_page(&self, page: RenderedPage) -> Result<String, PageError> {
        let png = page.png?;
        let response = self
            .ocr
            .detect_text(png)
            .await
            .map_err(|e| PageError::OcrFailed {
                page: page.page_num,
                detail: e.to_string(),
            })?;
        Ok(response.full_text().to_string())
    }
}
