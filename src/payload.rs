//! Upload payloads: raw bytes plus the media kind they were validated as.
//!
//! The declared content type from a browser is a hint at best, so the kind
//! is sniffed from the bytes themselves (`%PDF` magic, or the image crate's
//! format detection). Declared types and filename extensions are still
//! checked so that an obviously wrong upload (e.g. `.docx`) is refused
//! before it reaches OCR.

use crate::error::ValidationError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use std::path::Path;
use tracing::debug;

/// Filename extensions accepted on upload.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "pdf"];

/// The accepted media kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Png,
    Jpeg,
    Pdf,
}

impl MediaKind {
    pub fn mime_type(self) -> &'static str {
        match self {
            MediaKind::Png => "image/png",
            MediaKind::Jpeg => "image/jpeg",
            MediaKind::Pdf => "application/pdf",
        }
    }

    /// Extension used for archived objects.
    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Png => "png",
            MediaKind::Jpeg => "jpg",
            MediaKind::Pdf => "pdf",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        // Strip parameters such as "; charset=binary".
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/png" => Some(MediaKind::Png),
            "image/jpeg" | "image/jpg" => Some(MediaKind::Jpeg),
            "application/pdf" => Some(MediaKind::Pdf),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(MediaKind::Png),
            "jpg" | "jpeg" => Some(MediaKind::Jpeg),
            "pdf" => Some(MediaKind::Pdf),
            _ => None,
        }
    }

    /// Identify the kind from content alone.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            return Some(MediaKind::Pdf);
        }
        match image::guess_format(bytes) {
            Ok(image::ImageFormat::Png) => Some(MediaKind::Png),
            Ok(image::ImageFormat::Jpeg) => Some(MediaKind::Jpeg),
            _ => None,
        }
    }
}

/// A validated upload, owned by a single request.
#[derive(Debug, Clone)]
pub struct UploadPayload {
    pub bytes: Bytes,
    pub kind: MediaKind,
    pub file_name: Option<String>,
}

impl UploadPayload {
    /// Validate raw bytes with optional declared metadata.
    ///
    /// Rules, in order:
    /// 1. empty bytes are rejected;
    /// 2. a filename whose extension is not in [`ALLOWED_EXTENSIONS`] is rejected;
    /// 3. a declared content type that is neither accepted nor the generic
    ///    `application/octet-stream` is rejected;
    /// 4. the kind is sniffed from content, falling back to the declared type
    ///    and then the extension.
    pub fn new(
        bytes: impl Into<Bytes>,
        declared_type: Option<&str>,
        file_name: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(ValidationError::EmptyPayload);
        }

        let ext_kind = match file_name.and_then(extension_of) {
            Some(ext) => Some(MediaKind::from_extension(&ext).ok_or(ValidationError::FileTypeNotAllowed)?),
            None => None,
        };

        let declared_kind = match declared_type.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => match MediaKind::from_mime(t) {
                Some(kind) => Some(kind),
                None if is_generic_mime(t) => None,
                None => return Err(ValidationError::FileTypeNotAllowed),
            },
            None => None,
        };

        let kind = MediaKind::sniff(&bytes)
            .or(declared_kind)
            .or(ext_kind)
            .ok_or(ValidationError::FileTypeNotAllowed)?;

        debug!(
            "Validated upload: {} bytes as {}",
            bytes.len(),
            kind.mime_type()
        );

        Ok(Self {
            bytes,
            kind,
            file_name: file_name.map(str::to_string),
        })
    }

    /// Decode a base64 (or `data:` URL) string and validate the result.
    pub fn from_base64(encoded: &str) -> Result<Self, ValidationError> {
        let (declared, data) = split_data_url(encoded.trim());
        if data.is_empty() {
            return Err(ValidationError::EmptyPayload);
        }
        let bytes = STANDARD
            .decode(data)
            .map_err(|e| ValidationError::InvalidBase64(e.to_string()))?;
        Self::new(bytes, declared, None)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Validate an object name supplied by a caller for download.
pub fn validate_object_name(name: &str) -> Result<&str, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField("No file name provided"));
    }
    let escapes = trimmed.starts_with('/')
        || trimmed.contains('\\')
        || trimmed.split('/').any(|seg| seg == ".." || seg == "." || seg.is_empty());
    if escapes {
        return Err(ValidationError::InvalidFileName(trimmed.to_string()));
    }
    Ok(trimmed)
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

fn is_generic_mime(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or("").trim();
    essence.eq_ignore_ascii_case("application/octet-stream")
}

/// Split `data:image/png;base64,AAAA` into `(Some("image/png"), "AAAA")`.
/// Bare base64 is returned unchanged with no declared type.
fn split_data_url(input: &str) -> (Option<&str>, &str) {
    if let Some(rest) = input.strip_prefix("data:") {
        if let Some((meta, data)) = rest.split_once(',') {
            let mime = meta.split(';').next().filter(|m| !m.is_empty());
            return (mime, data);
        }
    }
    (None, input)
}
