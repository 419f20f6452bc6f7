//! Request orchestration.
//!
//! [`Tutor`] sequences the pipeline for each endpoint:
//!
//! ```text
//! Received ─▶ Validated ─▶ TextExtracted ─▶ Synthesized ─▶ Responded
//!     │           │              │  └─▶ Archived (result ignored)
//!     └───────────┴──────────────┴──────▶ Responded(error)
//! ```
//!
//! Every request is independent. The collaborators are shared read-only
//! handles, so one `Tutor` behind an `Arc` serves all in-flight requests.

use crate::clients::llm::ProviderGenerator;
use crate::clients::storage::SupabaseStorage;
use crate::clients::vision::VisionClient;
use crate::clients::{BlobStore, TextDetector, TextGenerator};
use crate::config::ServerConfig;
use crate::error::{StartupError, TutorError, ValidationError};
use crate::output::{FeedbackResult, QuestionList};
use crate::payload::{validate_object_name, UploadPayload};
use crate::pipeline::archive::UploadArchiver;
use crate::pipeline::extract::TextExtractor;
use crate::pipeline::render::{PageRasterizer, PdfiumRasterizer};
use crate::pipeline::synthesize::FeedbackSynthesizer;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Key prefix for archived whiteboard snapshots.
pub const WHITEBOARD_KEY_PREFIX: &str = "solution";
/// Key prefix for archived worksheet uploads.
pub const DOCUMENT_KEY_PREFIX: &str = "upload";

/// The external services a [`Tutor`] depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub ocr: Arc<dyn TextDetector>,
    pub llm: Arc<dyn TextGenerator>,
    pub store: Arc<dyn BlobStore>,
    pub rasterizer: Arc<dyn PageRasterizer>,
}

impl Collaborators {
    /// Build the production clients described by `config`.
    ///
    /// Call [`ServerConfig::check_readiness`] first; this only reports
    /// problems the readiness check cannot see (an invalid storage URL, a
    /// provider the LLM factory does not know).
    pub fn from_config(config: &ServerConfig) -> Result<Self, StartupError> {
        let ocr = VisionClient::new(
            config.ocr_endpoint.clone(),
            config.ocr_credentials_path.as_deref(),
        )
        .map_err(|e| StartupError::InvalidConfig(e.to_string()))?;

        let llm = ProviderGenerator::from_config(config)
            .map_err(|e| StartupError::InvalidConfig(e.to_string()))?;

        let store = SupabaseStorage::new(
            config.storage_url.as_deref().unwrap_or_default(),
            config.storage_key.clone().unwrap_or_default(),
        )
        .map_err(|e| StartupError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            ocr: Arc::new(ocr),
            llm: Arc::new(llm),
            store: Arc::new(store),
            rasterizer: Arc::new(PdfiumRasterizer::from_config(config)),
        })
    }
}

/// Request orchestrator shared by all HTTP handlers.
pub struct Tutor {
    extractor: TextExtractor,
    synthesizer: FeedbackSynthesizer,
    archiver: UploadArchiver,
    store: Arc<dyn BlobStore>,
    whiteboard_bucket: String,
    document_bucket: String,
}

impl Tutor {
    pub fn new(collaborators: Collaborators, config: &ServerConfig) -> Self {
        let Collaborators {
            ocr,
            llm,
            store,
            rasterizer,
        } = collaborators;
        Self {
            extractor: TextExtractor::new(ocr, rasterizer, config.page_concurrency),
            synthesizer: FeedbackSynthesizer::new(llm),
            archiver: UploadArchiver::new(Arc::clone(&store), config.archive_mode),
            store,
            whiteboard_bucket: config.whiteboard_bucket.clone(),
            document_bucket: config.document_bucket.clone(),
        }
    }

    /// `false` while running without OCR credentials.
    pub fn ocr_ready(&self) -> bool {
        self.extractor.is_ready()
    }

    /// Tutoring feedback for a base64 whiteboard snapshot.
    pub async fn analyze_work(
        &self,
        image: Option<&str>,
        problem_context: Option<&str>,
    ) -> Result<FeedbackResult, TutorError> {
        let image = image.ok_or(ValidationError::MissingField("No image data provided"))?;
        let payload = UploadPayload::from_base64(image)?;
        debug!("analyze-work: {} bytes", payload.len());

        let text = self.extract(&payload).await?;
        self.archiver
            .archive(&payload, &self.whiteboard_bucket, WHITEBOARD_KEY_PREFIX)
            .await;

        Ok(self.feedback_for(&text, problem_context).await)
    }

    /// Question list for an uploaded worksheet (image or PDF).
    pub async fn extract_questions(
        &self,
        payload: UploadPayload,
    ) -> Result<QuestionList, TutorError> {
        debug!(
            "extract-questions: {} bytes ({:?})",
            payload.len(),
            payload.file_name
        );

        let text = self.extract(&payload).await?;
        self.archiver
            .archive(&payload, &self.document_bucket, DOCUMENT_KEY_PREFIX)
            .await;

        if text.trim().is_empty() {
            info!("No text found in upload; returning no questions");
            return Ok(Vec::new());
        }

        let questions = self.synthesizer.synthesize_questions(&text).await?;
        info!("Extracted {} questions", questions.len());
        Ok(questions)
    }

    /// Tutoring feedback for an object already in the document bucket.
    pub async fn analyze_file(
        &self,
        file_name: Option<&str>,
        problem_context: Option<&str>,
    ) -> Result<FeedbackResult, TutorError> {
        let name = validate_object_name(file_name.unwrap_or_default())?;
        let bytes = self
            .store
            .download(&self.document_bucket, name)
            .await
            .inspect_err(|e| error!("Download of '{}' failed: {}", name, e))?;

        let payload = UploadPayload::new(bytes, None, Some(name))?;
        let text = self.extract(&payload).await?;
        Ok(self.feedback_for(&text, problem_context).await)
    }

    async fn extract(&self, payload: &UploadPayload) -> Result<String, TutorError> {
        self.extractor.extract_text(payload).await.map_err(|e| {
            error!("Text extraction failed: {}", e);
            TutorError::Ocr(e)
        })
    }

    async fn feedback_for(&self, text: &str, problem_context: Option<&str>) -> FeedbackResult {
        if text.trim().is_empty() {
            info!("No text found in upload");
            return FeedbackResult::nothing_readable();
        }
        self.synthesizer
            .synthesize_feedback(text, problem_context)
            .await
    }
}
