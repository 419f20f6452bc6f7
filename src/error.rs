//! Error types for the revision-tutor service.
//!
//! Each collaborator boundary has its own error enum so the orchestrator can
//! pattern-match on *which stage* failed:
//!
//! * [`ValidationError`]: the caller sent something we cannot process
//!   (missing field, bad base64, unsupported file type). Always a 400.
//! * [`OcrError`]: the OCR collaborator reported a failure or could not be
//!   reached, or a PDF could not be opened.
//! * [`LlmError`] / [`SynthesisError`]: the model call failed, or its reply
//!   did not validate against the required JSON schema.
//! * [`StorageError`]: the object store refused an upload or download.
//! * [`PageError`]: **non-fatal**. One PDF page failed to render or OCR.
//!   The page is blanked and the rest of the document continues.
//! * [`TutorError`]: one of the above, as returned by the orchestrator.
//! * [`StartupError`]: **fatal**. The process is not configured well enough
//!   to serve requests.
//!
//! Vendor error text is carried inside these values for logging only; the
//! HTTP layer ([`crate::server::ApiError`]) never echoes it to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Input rejected before any collaborator is called.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The required payload field (`image`, `file`, `fileName`) is absent.
    #[error("{0}")]
    MissingField(&'static str),

    /// The payload field is present but carries zero bytes.
    #[error("Uploaded data is empty")]
    EmptyPayload,

    /// `image` was not valid base64.
    #[error("Invalid Base64 image data: {0}")]
    InvalidBase64(String),

    /// Extension, declared content type, or sniffed content is outside the
    /// accepted set {png, jpeg, pdf}.
    #[error("File type not allowed")]
    FileTypeNotAllowed,

    /// A stored-object name that is empty, absolute, or escapes the bucket.
    #[error("Invalid file name '{0}'")]
    InvalidFileName(String),
}

/// OCR stage failures.
#[derive(Debug, Clone, Error)]
pub enum OcrError {
    /// No credential file was available at startup (degraded mode).
    #[error("OCR provider is not configured: {hint}")]
    NotConfigured { hint: String },

    /// Network, TLS, or non-2xx HTTP failure talking to the provider.
    #[error("OCR transport error: {0}")]
    Transport(String),

    /// The provider answered but reported an error for this image.
    #[error("OCR provider error: {message}")]
    Service { message: String },

    /// The provider answered with a body we could not decode.
    #[error("Unexpected OCR response: {0}")]
    InvalidResponse(String),

    /// Access-token exchange for the service account failed.
    #[error("OCR authentication failed: {0}")]
    Auth(String),

    /// The PDF itself could not be opened for rasterisation.
    #[error("Could not open PDF document: {0}")]
    Document(String),

    /// Every page of a PDF failed; there is no text to return.
    #[error("All {total} pages failed text extraction. First error: {first_error}")]
    AllPagesFailed { total: usize, first_error: String },

    /// Unexpected internal error (e.g. a blocking task panicked).
    #[error("Internal OCR error: {0}")]
    Internal(String),
}

/// LLM call failures.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// The configured provider could not be created (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured: {hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The API returned errors on every attempt.
    #[error("LLM call failed after {attempts} attempts: {detail}")]
    CallFailed { attempts: u32, detail: String },
}

/// Structured-output failures in extraction mode.
#[derive(Debug, Clone, Error)]
pub enum SynthesisError {
    /// The model could not be reached or kept failing.
    #[error("Question generation failed: {0}")]
    Generation(#[from] LlmError),

    /// The reply was not JSON, or was JSON of the wrong shape.
    #[error("Model output failed schema validation at {path}: {reason}")]
    Schema { path: String, reason: String },
}

impl SynthesisError {
    pub(crate) fn schema(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Object store failures.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The requested object does not exist.
    #[error("Object '{key}' not found in bucket '{bucket}'")]
    NotFound { bucket: String, key: String },

    /// Credentials were rejected (401/403).
    #[error("Storage rejected credentials: {0}")]
    Unauthorized(String),

    /// Any other non-2xx response.
    #[error("Storage error (HTTP {status}): {message}")]
    Service { status: u16, message: String },

    /// Network or URL construction failure.
    #[error("Storage transport error: {0}")]
    Transport(String),
}

/// A non-fatal error for a single PDF page.
///
/// The page contributes empty text to the document; the failure is logged.
#[derive(Debug, Clone, Error)]
pub enum PageError {
    /// Page rasterisation or PNG encoding failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// OCR failed for this page only.
    #[error("Page {page}: OCR failed: {detail}")]
    OcrFailed { page: usize, detail: String },
}

/// A failed request, tagged by the stage that failed.
///
/// Returned by [`crate::tutor::Tutor`]; the HTTP layer maps each variant to a
/// status code and a stable error code.
#[derive(Debug, Error)]
pub enum TutorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// Only raised when downloading a stored object; archival errors never
    /// reach the caller.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Fatal configuration problems detected by
/// [`crate::config::ServerConfig::check_readiness`].
#[derive(Debug, Error)]
pub enum StartupError {
    /// The API key for the configured LLM provider is absent.
    #[error("{var} is not set; the '{provider}' LLM provider cannot be used.\nExport {var}=... or add it to .env.")]
    MissingLlmKey { provider: String, var: &'static str },

    /// Storage URL or key is absent.
    #[error("Storage is not configured: {missing} not set.\nExport SUPABASE_URL and SUPABASE_KEY or add them to .env.")]
    MissingStorage { missing: &'static str },

    /// The OCR key file exists but could not be parsed.
    #[error("OCR credential file '{path}' is unreadable: {detail}")]
    BadOcrCredentials { path: PathBuf, detail: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
