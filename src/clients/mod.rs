//! Collaborator interfaces and their production clients.
//!
//! The orchestrator only ever sees the three traits below, held as
//! `Arc<dyn _>`, so tests can substitute in-process fakes:
//!
//! | Trait | Production client | Vendor |
//! |-------|-------------------|--------|
//! | [`TextDetector`]  | [`vision::VisionClient`]       | Google Cloud Vision |
//! | [`TextGenerator`] | [`llm::ProviderGenerator`]     | any `edgequake_llm` provider (Gemini by default) |
//! | [`BlobStore`]     | [`storage::SupabaseStorage`]   | Supabase Storage |
//!
//! Every client is `Send + Sync` and read-only after construction, so one
//! instance serves all in-flight requests.

pub mod llm;
pub mod storage;
pub mod vision;

use crate::error::{LlmError, OcrError, StorageError};
use async_trait::async_trait;
use bytes::Bytes;

/// One text annotation returned by the OCR provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextAnnotation {
    pub description: String,
}

/// OCR result for a single image, annotations ranked best-first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcrResponse {
    pub annotations: Vec<TextAnnotation>,
}

impl OcrResponse {
    /// Text of the top-ranked annotation, or `""` when nothing was found.
    pub fn full_text(&self) -> &str {
        self.annotations
            .first()
            .map(|a| a.description.as_str())
            .unwrap_or("")
    }
}

/// Optical character recognition over a single image.
#[async_trait]
pub trait TextDetector: Send + Sync {
    /// Detect text in PNG or JPEG bytes.
    ///
    /// A provider-reported error is returned as `Err`, never as an empty
    /// response.
    async fn detect_text(&self, image: Bytes) -> Result<OcrResponse, OcrError>;

    /// `false` when the detector was built without credentials.
    fn is_ready(&self) -> bool {
        true
    }
}

/// Single-prompt text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Return the model's raw reply to `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Object storage keyed by `(bucket, key)`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError>;
}
