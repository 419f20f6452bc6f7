//! Route handlers.
//!
//! Handlers only translate between HTTP and [`Tutor`]: they take the
//! extractor results as `Result` so rejections leave in the service's own
//! error shape, call one orchestrator method, and serialise the outcome.

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ApiError;
use super::AppState;
use crate::error::ValidationError;
use crate::output::{FeedbackResult, QuestionList};
use crate::payload::UploadPayload;

/// Multipart field names that may carry the upload.
pub const UPLOAD_FIELDS: [&str; 2] = ["file", "image"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeWorkRequest {
    pub image: Option<String>,
    pub problem_context: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeFileRequest {
    pub file_name: Option<String>,
    pub problem_context: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub ocr: String,
}

/// `POST /analyze-work`
pub async fn analyze_work(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeWorkRequest>, JsonRejection>,
) -> Result<Json<FeedbackResult>, ApiError> {
    let Json(req) = body?;
    let result = state
        .tutor
        .analyze_work(req.image.as_deref(), req.problem_context.as_deref())
        .await?;
    Ok(Json(result))
}

/// `POST /extract-questions`
pub async fn extract_questions(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<QuestionList>, ApiError> {
    let mut multipart = multipart?;

    let mut payload = None;
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if !UPLOAD_FIELDS.contains(&name.as_str()) {
            debug!("Ignoring multipart field '{}'", name);
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.is_empty());
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        payload = Some(UploadPayload::new(
            bytes,
            content_type.as_deref(),
            file_name.as_deref(),
        )?);
        break;
    }

    let payload = payload.ok_or(ValidationError::MissingField("No file uploaded"))?;
    let questions = state.tutor.extract_questions(payload).await?;
    Ok(Json(questions))
}

/// `POST /analyze-file`
pub async fn analyze_file(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeFileRequest>, JsonRejection>,
) -> Result<Json<FeedbackResult>, ApiError> {
    let Json(req) = body?;
    let result = state
        .tutor
        .analyze_file(req.file_name.as_deref(), req.problem_context.as_deref())
        .await?;
    Ok(Json(result))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let ready = state.tutor.ocr_ready();
    Json(HealthResponse {
        status: if ready { "ok" } else { "degraded" }.to_string(),
        ocr: if ready { "ready" } else { "degraded" }.to_string(),
    })
}
