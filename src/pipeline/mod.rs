//! Pipeline stages between an upload and a response body.
//!
//! Each submodule implements exactly one step, so each can be tested with
//! fake collaborators and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌──────────── archive (best effort)
//! payload ───┤
//!            └── extract ──▶ synthesize ──▶ FeedbackResult | QuestionList
//!                 │   ▲          │
//!          render ▼   │ OCR      ▼ postprocess
//!         (pdfium) encode     (fence strip)
//! ```
//!
//! 1. [`render`]: rasterise PDF pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 2. [`encode`]: PNG-encode each rendered page for the OCR request
//! 3. [`extract`]: OCR images directly, PDFs page by page
//! 4. [`postprocess`]: strip code fences and stray characters from model
//!    replies
//! 5. [`synthesize`]: prompt the model and validate its JSON reply
//! 6. [`archive`]: copy the original upload to object storage, ignoring
//!    failures

pub mod archive;
pub mod encode;
pub mod extract;
pub mod postprocess;
pub mod render;
pub mod synthesize;
