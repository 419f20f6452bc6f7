//! HTTP error responses.
//!
//! Every failure leaves the service as `{"error", "code", "details"?}` with
//! a status taken from [`ErrorKind`]. `error` is written for the student,
//! `code` is stable for clients and tests, `details` only ever carries our
//! own validation text. Vendor error strings are logged where they occur and
//! never reach the body.

use std::borrow::Cow;
use std::fmt;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::{StorageError, SynthesisError, TutorError, ValidationError};

/// Every error the HTTP layer can return.
#[must_use = "error kinds do nothing unless used to create errors"]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 400: missing field, bad base64, unparseable body.
    InvalidInput,
    /// 400: extension, content type or content outside {png, jpeg, pdf}.
    FileTypeNotAllowed,
    /// 404: `/analyze-file` named an object that does not exist.
    NotFound,
    /// 500: OCR failed or is not configured.
    OcrFailed,
    /// 500: the model could not be reached.
    SynthesisUnavailable,
    /// 500: the model replied, but not in the required shape.
    SynthesisSchema,
    /// 500: the object store refused a download.
    StorageFailed,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::InvalidInput | Self::FileTypeNotAllowed => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::OcrFailed
            | Self::SynthesisUnavailable
            | Self::SynthesisSchema
            | Self::StorageFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::FileTypeNotAllowed => "file_type_not_allowed",
            Self::NotFound => "not_found",
            Self::OcrFailed => "ocr_failed",
            Self::SynthesisUnavailable => "synthesis_unavailable",
            Self::SynthesisSchema => "synthesis_schema",
            Self::StorageFailed => "storage_failed",
        }
    }

    /// Message used when no custom one is attached.
    pub fn default_message(self) -> &'static str {
        match self {
            Self::InvalidInput => "Invalid request",
            Self::FileTypeNotAllowed => "File type not allowed",
            Self::NotFound => "File not found",
            Self::OcrFailed => "Failed to perform OCR on the image",
            Self::SynthesisUnavailable => "Could not generate questions right now. Please try again.",
            Self::SynthesisSchema => "Could not read questions from the model's reply",
            Self::StorageFailed => "Could not retrieve the file",
        }
    }

    #[inline]
    pub fn with_message(self, message: impl Into<Cow<'static, str>>) -> ApiError {
        ApiError::new(self).with_message(message)
    }

    #[inline]
    pub fn with_details(self, details: impl Into<Cow<'static, str>>) -> ApiError {
        ApiError::new(self).with_details(details)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The error type returned by every handler.
#[derive(Debug, Clone)]
#[must_use = "errors do nothing unless serialized"]
pub struct ApiError {
    kind: ErrorKind,
    message: Option<Cow<'static, str>>,
    details: Option<Cow<'static, str>>,
}

impl ApiError {
    #[inline]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            details: None,
        }
    }

    #[inline]
    pub fn with_message(self, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: Some(message.into()),
            ..self
        }
    }

    #[inline]
    pub fn with_details(self, details: impl Into<Cow<'static, str>>) -> Self {
        Self {
            details: Some(details.into()),
            ..self
        }
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        self.message
            .as_deref()
            .unwrap_or_else(|| self.kind.default_message())
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.kind,
            self.kind.status_code().as_u16(),
            self.message()
        )?;
        if let Some(details) = &self.details {
            write!(f, " - {}", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message(),
            code: self.kind.code(),
            details: self.details(),
        };
        (self.kind.status_code(), Json(body)).into_response()
    }
}

impl From<ErrorKind> for ApiError {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::FileTypeNotAllowed => ApiError::new(ErrorKind::FileTypeNotAllowed),
            other => ErrorKind::InvalidInput.with_message(other.to_string()),
        }
    }
}

impl From<TutorError> for ApiError {
    fn from(e: TutorError) -> Self {
        match e {
            TutorError::Validation(v) => v.into(),
            TutorError::Ocr(_) => ApiError::new(ErrorKind::OcrFailed),
            TutorError::Synthesis(SynthesisError::Generation(_)) => {
                ApiError::new(ErrorKind::SynthesisUnavailable)
            }
            TutorError::Synthesis(SynthesisError::Schema { path, reason }) => {
                ErrorKind::SynthesisSchema.with_details(format!("{path}: {reason}"))
            }
            TutorError::Storage(StorageError::NotFound { key, .. }) => {
                ErrorKind::NotFound.with_message(format!("File '{key}' not found"))
            }
            TutorError::Storage(_) => ApiError::new(ErrorKind::StorageFailed),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::MissingJsonContentType(_) => ErrorKind::InvalidInput
                .with_message("Expected a JSON body")
                .with_details("Set 'Content-Type: application/json'."),
            other => ErrorKind::InvalidInput
                .with_message("Invalid JSON body")
                .with_details(other.body_text()),
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        match rejection {
            MultipartRejection::InvalidBoundary(_) => ErrorKind::InvalidInput
                .with_message("Invalid multipart boundary")
                .with_details(
                    "The Content-Type header is missing or has an invalid boundary parameter. \
                     Ensure the request uses 'multipart/form-data' with a valid boundary.",
                ),
            other => ErrorKind::InvalidInput
                .with_message("Invalid multipart request")
                .with_details(other.body_text()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        let status = e.status();
        let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "Upload is too large"
        } else {
            "Invalid multipart request"
        };
        ErrorKind::InvalidInput
            .with_message(message)
            .with_details(e.body_text())
    }
}
