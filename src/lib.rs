//! # revision-tutor
//!
//! HTTP backend for a handwriting math tutor. A student's whiteboard snapshot
//! or worksheet goes in; tutoring feedback or a list of questions with hints
//! comes out.
//!
//! ## Why this crate?
//!
//! There is no clever algorithm here: OCR, language understanding and storage
//! are all external services. What the crate owns is the glue between them,
//! and that glue is where such services usually break. Uploads arrive as
//! base64, data URLs, or multipart parts with the wrong content type. Models
//! wrap their JSON in fences or return two suggestions instead of three. Storage
//! goes down. Every one of those cases maps to a fixed response contract here.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Validate  base64 / multipart → UploadPayload (png, jpeg, pdf)
//!  ├─ 2. Extract   OCR the image, or rasterise the PDF and OCR each page
//!  ├─ 3. Archive   copy the upload to object storage (failure ignored)
//!  ├─ 4. Synthesize prompt the LLM and validate its JSON reply
//!  └─ 5. Respond   FeedbackResult | [Question] | {error, code}
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use revision_tutor::{router, AppState, Collaborators, ServerConfig, Tutor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::builder()
//!         .ocr_credentials_path("keys/vision.json")
//!         .storage("https://project.supabase.co", "service-role-key")
//!         .build()?;
//!     let readiness = config.check_readiness()?;
//!     if readiness.is_degraded() {
//!         eprintln!("OCR unavailable: {:?}", readiness.ocr);
//!     }
//!
//!     let tutor = Tutor::new(Collaborators::from_config(&config)?, &config);
//!     let app = router(AppState::new(tutor), &config);
//!     let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `revision-tutor` binary (clap + anyhow + dotenvy + tracing-subscriber) |
//!
//! Disable `cli` when embedding the router in another service:
//! ```toml
//! revision-tutor = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod clients;
pub mod config;
pub mod error;
pub mod output;
pub mod payload;
pub mod pipeline;
pub mod prompts;
pub mod server;
pub mod tutor;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use clients::{BlobStore, OcrResponse, TextAnnotation, TextDetector, TextGenerator};
pub use config::{ArchiveMode, OcrReadiness, Readiness, ServerConfig, ServerConfigBuilder};
pub use error::{
    LlmError, OcrError, PageError, StartupError, StorageError, SynthesisError, TutorError,
    ValidationError,
};
pub use output::{FeedbackResult, Question, QuestionList, Suggestion, SuggestionKind};
pub use payload::{MediaKind, UploadPayload};
pub use pipeline::render::{PageRasterizer, RenderedPage};
pub use server::{router, serve, ApiError, AppState};
pub use tutor::{Collaborators, Tutor};
