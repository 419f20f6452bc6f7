//! HTTP integration tests for revision-tutor.
//!
//! These drive the real axum router through `axum-test` with in-process
//! fakes for OCR, the LLM, object storage and PDF rasterisation, so they
//! need no network access, credentials or pdfium.
//!
//! Run with:
//!   cargo test --test http

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use revision_tutor::output::{NOTHING_READABLE_SUGGESTION, FALLBACK_SUGGESTION};
use revision_tutor::{
    router, AppState, ArchiveMode, BlobStore, Collaborators, FeedbackResult, LlmError, OcrError,
    OcrResponse, PageError, PageRasterizer, Question, RenderedPage, ServerConfig, StorageError,
    TextAnnotation, TextDetector, TextGenerator, Tutor,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

// ── Test fakes ───────────────────────────────────────────────────────────────

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";
const PDF: &[u8] = b"%PDF-1.7\n%fake\n";

/// OCR fake: returns the text scripted for an exact image, `default` otherwise.
struct FakeOcr {
    scripted: HashMap<Vec<u8>, Result<String, OcrError>>,
    default: Result<String, OcrError>,
    ready: bool,
    calls: AtomicUsize,
}

impl FakeOcr {
    fn reading(text: &str) -> Self {
        Self {
            scripted: HashMap::new(),
            default: Ok(text.to_string()),
            ready: true,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            default: Err(OcrError::Service {
                message: "Bad image data. (internal vendor detail 0xBEEF)".into(),
            }),
            ..Self::reading("")
        }
    }

    fn unconfigured() -> Self {
        Self {
            default: Err(OcrError::NotConfigured {
                hint: "no key file".into(),
            }),
            ready: false,
            ..Self::reading("")
        }
    }

    fn script(mut self, image: &[u8], result: Result<&str, OcrError>) -> Self {
        self.scripted
            .insert(image.to_vec(), result.map(str::to_string));
        self
    }
}

#[async_trait::async_trait]
impl TextDetector for FakeOcr {
    async fn detect_text(&self, image: Bytes) -> Result<OcrResponse, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self
            .scripted
            .get(image.as_ref())
            .unwrap_or(&self.default)
            .clone()?;
        if result.is_empty() {
            return Ok(OcrResponse::default());
        }
        Ok(OcrResponse {
            annotations: vec![TextAnnotation {
                description: result,
            }],
        })
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}

/// LLM fake: always answers with the same reply.
struct FakeLlm {
    reply: Result<String, LlmError>,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlm {
    fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl TextGenerator for FakeLlm {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone()
    }
}

/// Object store fake: an in-memory map with an optional upload failure.
#[derive(Default)]
struct FakeStore {
    objects: Mutex<HashMap<(String, String), Bytes>>,
    fail_uploads: bool,
    uploads: AtomicUsize,
}

impl FakeStore {
    fn with_object(self, bucket: &str, key: &str, bytes: &'static [u8]) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.into(), key.into()), Bytes::from_static(bytes));
        self
    }

    fn keys_in(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl BlobStore for FakeStore {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads {
            return Err(StorageError::Service {
                status: 500,
                message: "quota exceeded".into(),
            });
        }
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.into(), key.into()), bytes);
        Ok(())
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.into(),
                key: key.into(),
            })
    }
}

/// Rasterizer fake: every PDF has the same pages.
struct FakePages(Vec<RenderedPage>);

impl FakePages {
    fn of(pages: &[&'static [u8]]) -> Self {
        Self(
            pages
                .iter()
                .enumerate()
                .map(|(i, png)| RenderedPage {
                    page_num: i + 1,
                    png: Ok(Bytes::from_static(png)),
                })
                .collect(),
        )
    }
}

#[async_trait::async_trait]
impl PageRasterizer for FakePages {
    async fn rasterize(&self, _pdf: Bytes) -> Result<Vec<RenderedPage>, OcrError> {
        Ok(self.0.clone())
    }
}

// ── Test helpers ─────────────────────────────────────────────────────────────

struct Harness {
    server: TestServer,
    ocr: Arc<FakeOcr>,
    llm: Arc<FakeLlm>,
    store: Arc<FakeStore>,
}

/// Route service logs through the test writer; `RUST_LOG=debug` shows them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn harness(ocr: FakeOcr, llm: FakeLlm, store: FakeStore, pages: FakePages) -> Harness {
    init_tracing();
    let ocr = Arc::new(ocr);
    let llm = Arc::new(llm);
    let store = Arc::new(store);
    let config = ServerConfig::builder()
        .archive_mode(ArchiveMode::Blocking)
        .build()
        .unwrap();
    let collaborators = Collaborators {
        ocr: ocr.clone(),
        llm: llm.clone(),
        store: store.clone(),
        rasterizer: Arc::new(pages),
    };
    let tutor = Tutor::new(collaborators, &config);
    let server = TestServer::new(router(AppState::new(tutor), &config)).unwrap();
    Harness {
        server,
        ocr,
        llm,
        store,
    }
}

fn simple(ocr: FakeOcr, llm: FakeLlm) -> Harness {
    harness(ocr, llm, FakeStore::default(), FakePages::of(&[]))
}

fn feedback_reply(correct: bool, suggestion: &str) -> String {
    json!({"isCorrect": correct, "suggestion": suggestion}).to_string()
}

fn question(id: u64, kinds: &[&str]) -> Value {
    json!({
        "id": id,
        "title": format!("Question {id}"),
        "suggestions": kinds
            .iter()
            .map(|k| json!({"type": k, "title": "Hint", "content": "Try this."}))
            .collect::<Vec<_>>(),
    })
}

fn pdf_form(field: &str, name: &str, bytes: &'static [u8], mime: &str) -> MultipartForm {
    MultipartForm::new().add_part(
        field,
        Part::bytes(bytes.to_vec()).file_name(name).mime_type(mime),
    )
}

// ── /analyze-work ────────────────────────────────────────────────────────────

#[tokio::test]
async fn blank_whiteboard_is_nothing_readable() {
    let h = simple(FakeOcr::reading("   \n "), FakeLlm::replying("unused"));

    let res = h
        .server
        .post("/analyze-work")
        .json(&json!({"image": STANDARD.encode(PNG)}))
        .await;

    assert_eq!(res.status_code(), StatusCode::OK);
    let body: FeedbackResult = res.json();
    assert!(!body.is_correct);
    assert_eq!(body.suggestion, NOTHING_READABLE_SUGGESTION);
    assert_eq!(h.llm.calls(), 0);
}

#[tokio::test]
async fn analyze_work_returns_model_feedback() {
    let h = simple(
        FakeOcr::reading("x + 5 = 12\nx = 7"),
        FakeLlm::replying(feedback_reply(true, "Correct! Now check by substituting.")),
    );

    let res = h
        .server
        .post("/analyze-work")
        .json(&json!({
            "image": STANDARD.encode(PNG),
            "problemContext": "Solve x + 5 = 12",
        }))
        .await;

    assert_eq!(res.status_code(), StatusCode::OK);
    let body: Value = res.json();
    assert_eq!(
        body,
        json!({"isCorrect": true, "suggestion": "Correct! Now check by substituting."})
    );
    let prompts = h.llm.prompts.lock().unwrap();
    assert!(prompts[0].contains("Solve x + 5 = 12"));
    assert!(prompts[0].contains("x = 7"));
}

#[tokio::test]
async fn malformed_base64_is_rejected_without_collaborators() {
    let h = simple(FakeOcr::reading("x = 7"), FakeLlm::replying("unused"));

    let res = h
        .server
        .post("/analyze-work")
        .json(&json!({"image": "not*base64!!"}))
        .await;

    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = res.json();
    assert_eq!(body["code"], "invalid_input");
    assert!(body["error"].as_str().unwrap().starts_with("Invalid Base64"));
    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.llm.calls(), 0);
    assert_eq!(h.store.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_image_is_rejected() {
    let h = simple(FakeOcr::reading("x"), FakeLlm::replying("unused"));
    let res = h
        .server
        .post("/analyze-work")
        .json(&json!({"problemContext": "algebra"}))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = res.json();
    assert_eq!(body["error"], "No image data provided");
}

#[tokio::test]
async fn non_json_body_is_rejected_in_error_shape() {
    let h = simple(FakeOcr::reading("x"), FakeLlm::replying("unused"));
    let res = h.server.post("/analyze-work").text("image=abc").await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = res.json();
    assert_eq!(body["code"], "invalid_input");
}

#[tokio::test]
async fn data_url_images_are_accepted() {
    let h = simple(
        FakeOcr::reading("2x = 10"),
        FakeLlm::replying(feedback_reply(false, "Divide both sides by 2.")),
    );
    let data_url = format!("data:image/png;base64,{}", STANDARD.encode(PNG));
    let res = h
        .server
        .post("/analyze-work")
        .json(&json!({"image": data_url}))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let body: FeedbackResult = res.json();
    assert_eq!(body.suggestion, "Divide both sides by 2.");
}

#[tokio::test]
async fn fenced_reply_parses_like_plain_reply() {
    let plain = feedback_reply(false, "Check the sign when moving 5.");
    let fenced = format!("```json\n{plain}\n```");
    let nested = format!("```\n{fenced}\n```");

    let mut bodies = Vec::new();
    for reply in [plain, fenced, nested] {
        let h = simple(FakeOcr::reading("x = 17"), FakeLlm::replying(reply));
        let res = h
            .server
            .post("/analyze-work")
            .json(&json!({"image": STANDARD.encode(PNG)}))
            .await;
        assert_eq!(res.status_code(), StatusCode::OK);
        bodies.push(res.json::<Value>());
    }
    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[0], bodies[2]);
}

#[tokio::test]
async fn unparseable_reply_falls_back() {
    let h = simple(
        FakeOcr::reading("x = 7"),
        FakeLlm::replying("Looks great to me!"),
    );
    let res = h
        .server
        .post("/analyze-work")
        .json(&json!({"image": STANDARD.encode(PNG)}))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let body: FeedbackResult = res.json();
    assert!(!body.is_correct);
    assert_eq!(body.suggestion, FALLBACK_SUGGESTION);
}

#[tokio::test]
async fn ocr_failure_is_500_without_vendor_text() {
    let h = simple(FakeOcr::failing(), FakeLlm::replying("unused"));
    let res = h
        .server
        .post("/analyze-work")
        .json(&json!({"image": STANDARD.encode(PNG)}))
        .await;

    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json();
    assert_eq!(body["code"], "ocr_failed");
    assert!(!body.to_string().contains("0xBEEF"));
    assert_eq!(h.llm.calls(), 0);
}

#[tokio::test]
async fn archive_failure_does_not_change_response() {
    let reply = feedback_reply(true, "Well done.");
    let request = json!({"image": STANDARD.encode(PNG)});

    let ok = harness(
        FakeOcr::reading("x = 7"),
        FakeLlm::replying(reply.clone()),
        FakeStore::default(),
        FakePages::of(&[]),
    );
    let broken = harness(
        FakeOcr::reading("x = 7"),
        FakeLlm::replying(reply),
        FakeStore {
            fail_uploads: true,
            ..Default::default()
        },
        FakePages::of(&[]),
    );

    let a = ok.server.post("/analyze-work").json(&request).await;
    let b = broken.server.post("/analyze-work").json(&request).await;

    assert_eq!(a.status_code(), b.status_code());
    assert_eq!(a.text(), b.text());
    assert_eq!(broken.store.uploads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn whiteboard_upload_is_archived() {
    let h = simple(
        FakeOcr::reading("x = 7"),
        FakeLlm::replying(feedback_reply(true, "Nice.")),
    );
    h.server
        .post("/analyze-work")
        .json(&json!({"image": STANDARD.encode(PNG)}))
        .await
        .assert_status_ok();

    let keys = h.store.keys_in("WhiteBoardImages");
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("solution-"));
    assert!(keys[0].ends_with(".png"));
}

// ── /extract-questions ───────────────────────────────────────────────────────

#[tokio::test]
async fn two_page_pdf_joins_page_text() {
    let reply = json!([question(1, &["info", "logic", "feedback"])]).to_string();
    let h = harness(
        FakeOcr::reading("")
            .script(b"page-1", Ok("P1"))
            .script(b"page-2", Ok("P2")),
        FakeLlm::replying(reply),
        FakeStore::default(),
        FakePages::of(&[b"page-1", b"page-2"]),
    );

    let res = h
        .server
        .post("/extract-questions")
        .multipart(pdf_form("file", "worksheet.pdf", PDF, "application/pdf"))
        .await;

    assert_eq!(res.status_code(), StatusCode::OK);
    let prompts = h.llm.prompts.lock().unwrap();
    assert!(prompts[0].contains("---\nP1\n\nP2\n---"), "prompt: {}", prompts[0]);

    let keys = h.store.keys_in("PDFBucket");
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("upload-") && keys[0].ends_with(".pdf"));
}

#[tokio::test]
async fn failed_page_is_blanked_not_fatal() {
    let reply = json!([question(1, &["info", "logic", "feedback"])]).to_string();
    let broken = RenderedPage {
        page_num: 2,
        png: Err(PageError::RenderFailed {
            page: 2,
            detail: "bad stream".into(),
        }),
    };
    let mut pages = FakePages::of(&[b"page-1"]);
    pages.0.push(broken);

    let h = harness(
        FakeOcr::reading("").script(b"page-1", Ok("P1")),
        FakeLlm::replying(reply),
        FakeStore::default(),
        pages,
    );

    let res = h
        .server
        .post("/extract-questions")
        .multipart(pdf_form("file", "worksheet.pdf", PDF, "application/pdf"))
        .await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert!(h.llm.prompts.lock().unwrap()[0].contains("---\nP1\n\n\n---"));
}

#[tokio::test]
async fn valid_questions_are_returned() {
    let reply = format!(
        "```json\n{}\n```",
        json!([
            question(1, &["info", "logic", "feedback"]),
            question(2, &["info", "logic", "feedback"]),
        ])
    );
    let h = simple(FakeOcr::reading("1. Solve x + 5 = 12\n2. Factor x^2 - 9"), FakeLlm::replying(reply));

    let res = h
        .server
        .post("/extract-questions")
        .multipart(pdf_form("file", "scan.png", PNG, "image/png"))
        .await;

    assert_eq!(res.status_code(), StatusCode::OK);
    let questions: Vec<Question> = res.json();
    assert_eq!(questions.len(), 2);
    assert!(questions
        .iter()
        .all(|q| q.suggestions.len() == Question::SUGGESTION_COUNT));
}

#[tokio::test]
async fn image_field_name_is_accepted() {
    let reply = json!([question(1, &["info", "logic", "feedback"])]).to_string();
    let h = simple(FakeOcr::reading("Solve 3x = 9"), FakeLlm::replying(reply));
    let res = h
        .server
        .post("/extract-questions")
        .multipart(pdf_form("image", "photo.jpg", PNG, "image/png"))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn wrong_suggestion_count_is_schema_error() {
    let reply = json!([question(1, &["info", "logic"])]).to_string();
    let h = simple(FakeOcr::reading("Solve 3x = 9"), FakeLlm::replying(reply));

    let res = h
        .server
        .post("/extract-questions")
        .multipart(pdf_form("file", "scan.png", PNG, "image/png"))
        .await;

    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json();
    assert_eq!(body["code"], "synthesis_schema");
    assert_ne!(body["code"], "ocr_failed");
    assert!(body["details"].as_str().unwrap().contains("[0].suggestions"));
}

#[tokio::test]
async fn model_outage_is_distinct_from_schema_error() {
    let llm = FakeLlm {
        reply: Err(LlmError::CallFailed {
            attempts: 3,
            detail: "503".into(),
        }),
        prompts: Mutex::new(Vec::new()),
    };
    let h = simple(FakeOcr::reading("Solve 3x = 9"), llm);

    let res = h
        .server
        .post("/extract-questions")
        .multipart(pdf_form("file", "scan.png", PNG, "image/png"))
        .await;

    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json();
    assert_eq!(body["code"], "synthesis_unavailable");
}

#[tokio::test]
async fn no_text_means_no_questions() {
    let h = simple(FakeOcr::reading(""), FakeLlm::replying("unused"));
    let res = h
        .server
        .post("/extract-questions")
        .multipart(pdf_form("file", "blank.png", PNG, "image/png"))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.json::<Value>(), json!([]));
    assert_eq!(h.llm.calls(), 0);
}

#[tokio::test]
async fn docx_is_not_allowed() {
    let h = simple(FakeOcr::reading("x"), FakeLlm::replying("unused"));

    let res = h
        .server
        .post("/extract-questions")
        .multipart(pdf_form(
            "file",
            "homework.docx",
            b"PK\x03\x04\x14\0\x06\0",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ))
        .await;

    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = res.json();
    assert_eq!(body["error"], "File type not allowed");
    assert_eq!(body["code"], "file_type_not_allowed");
    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_file_field_is_rejected() {
    let h = simple(FakeOcr::reading("x"), FakeLlm::replying("unused"));
    let form = MultipartForm::new().add_text("note", "hello");
    let res = h.server.post("/extract-questions").multipart(form).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<Value>()["error"], "No file uploaded");
}

#[tokio::test]
async fn degraded_ocr_fails_requests_with_ocr_code() {
    let h = simple(FakeOcr::unconfigured(), FakeLlm::replying("unused"));
    let res = h
        .server
        .post("/extract-questions")
        .multipart(pdf_form("file", "scan.png", PNG, "image/png"))
        .await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.json::<Value>()["code"], "ocr_failed");
}

// ── /analyze-file ────────────────────────────────────────────────────────────

#[tokio::test]
async fn analyze_file_reads_from_document_bucket() {
    let h = harness(
        FakeOcr::reading("").script(b"page-1", Ok("3x = 9\nx = 3")),
        FakeLlm::replying(feedback_reply(true, "That's right.")),
        FakeStore::default().with_object("PDFBucket", "week1/quiz.pdf", PDF),
        FakePages::of(&[b"page-1"]),
    );

    let res = h
        .server
        .post("/analyze-file")
        .json(&json!({"fileName": "week1/quiz.pdf"}))
        .await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(
        res.json::<Value>(),
        json!({"isCorrect": true, "suggestion": "That's right."})
    );
    assert_eq!(h.store.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn analyze_file_missing_object_is_404() {
    let h = simple(FakeOcr::reading("x"), FakeLlm::replying("unused"));
    let res = h
        .server
        .post("/analyze-file")
        .json(&json!({"fileName": "nope.pdf"}))
        .await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(res.json::<Value>()["code"], "not_found");
}

#[tokio::test]
async fn analyze_file_rejects_path_traversal() {
    let h = simple(FakeOcr::reading("x"), FakeLlm::replying("unused"));
    for name in ["../secrets.pdf", "/etc/passwd", ""] {
        let res = h
            .server
            .post("/analyze-file")
            .json(&json!({"fileName": name}))
            .await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST, "name {name:?}");
    }
}

// ── /health and routing ──────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_ocr_state() {
    let ready = simple(FakeOcr::reading(""), FakeLlm::replying(""));
    let res = ready.server.get("/health").await;
    assert_eq!(res.json::<Value>(), json!({"status": "ok", "ocr": "ready"}));

    let degraded = simple(FakeOcr::unconfigured(), FakeLlm::replying(""));
    let res = degraded.server.get("/health").await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(
        res.json::<Value>(),
        json!({"status": "degraded", "ocr": "degraded"})
    );
}

#[tokio::test]
async fn api_prefix_alias_serves_same_routes() {
    let h = simple(
        FakeOcr::reading("x = 7"),
        FakeLlm::replying(feedback_reply(true, "Good.")),
    );
    let res = h
        .server
        .post("/api/analyze-work")
        .json(&json!({"image": STANDARD.encode(PNG)}))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    h.server.get("/api/health").await.assert_status_ok();
}
