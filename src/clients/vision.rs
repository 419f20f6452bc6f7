//! Google Cloud Vision text detection over REST.
//!
//! ## Authentication
//!
//! The service-account key file (the JSON downloaded from the cloud
//! console) holds a client e-mail, an RSA private key and a token URI. We
//! sign a short-lived RS256 assertion with the key, exchange it at the token
//! URI for an OAuth access token, and cache that token until one minute
//! before it expires. The cache is the only mutable state in the client and
//! sits behind an async mutex.
//!
//! ## Degraded mode
//!
//! Built without a key file, the client still constructs; every call then
//! fails with [`OcrError::NotConfigured`] so requests get a clean 500 rather
//! than the process refusing to start.

use crate::clients::{OcrResponse, TextAnnotation, TextDetector};
use crate::error::OcrError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const VISION_SCOPE: &str = "https://www.googleapis.com/auth/cloud-vision";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3600;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The fields of a service-account key file that we use.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    /// Read and parse a key file.
    pub fn from_file(path: &Path) -> Result<Self, OcrError> {
        let raw = std::fs::read_to_string(path).map_err(|e| OcrError::NotConfigured {
            hint: format!("cannot read '{}': {e}", path.display()),
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, OcrError> {
        let key: Self = serde_json::from_str(raw).map_err(|e| OcrError::NotConfigured {
            hint: format!("not a service-account key file: {e}"),
        })?;
        if key.client_email.is_empty() || key.private_key.is_empty() {
            return Err(OcrError::NotConfigured {
                hint: "key file is missing client_email or private_key".into(),
            });
        }
        Ok(key)
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

// ── Wire format ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnnotateRequest<'a> {
    requests: [AnnotateImageRequest<'a>; 1],
}

#[derive(Debug, Serialize)]
struct AnnotateImageRequest<'a> {
    image: ImageContent,
    features: [Feature<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Debug, Serialize)]
struct Feature<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    text_annotations: Vec<WireAnnotation>,
    #[serde(default)]
    error: Option<WireStatus>,
}

#[derive(Debug, Deserialize)]
struct WireAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    #[serde(default)]
    message: String,
}

/// Translate a decoded `images:annotate` body into our response type.
///
/// A non-empty `error.message` on the first response wins over any
/// annotations it carries.
pub(crate) fn interpret_response(body: AnnotateResponse) -> Result<OcrResponse, OcrError> {
    let first = body.responses.into_iter().next().unwrap_or_default();
    if let Some(status) = first.error {
        if !status.message.is_empty() {
            return Err(OcrError::Service {
                message: status.message,
            });
        }
    }
    Ok(OcrResponse {
        annotations: first
            .text_annotations
            .into_iter()
            .map(|a| TextAnnotation {
                description: a.description,
            })
            .collect(),
    })
}

/// Cloud Vision client.
pub struct VisionClient {
    http: reqwest::Client,
    endpoint: String,
    key: Option<ServiceAccountKey>,
    token: Mutex<Option<CachedToken>>,
}

impl VisionClient {
    /// Build a client from an optional key file path.
    ///
    /// A missing path or file yields a degraded client; a file that exists
    /// but does not parse is an error.
    pub fn new(endpoint: impl Into<String>, key_path: Option<&Path>) -> Result<Self, OcrError> {
        let key = match key_path {
            Some(path) if path.exists() => {
                let key = ServiceAccountKey::from_file(path)?;
                info!("OCR authenticated as {}", key.client_email);
                Some(key)
            }
            Some(path) => {
                warn!(
                    "OCR credential file '{}' not found; OCR is disabled",
                    path.display()
                );
                None
            }
            None => {
                warn!("No OCR credential file configured; OCR is disabled");
                None
            }
        };
        Ok(Self::with_key(endpoint, key))
    }

    pub fn with_key(endpoint: impl Into<String>, key: Option<ServiceAccountKey>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            key,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self, key: &ServiceAccountKey) -> Result<String, OcrError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let assertion = sign_assertion(key)?;
        let response = self
            .http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| OcrError::Auth(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::Auth(format!("HTTP {status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| OcrError::Auth(format!("bad token response: {e}")))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!("Fetched OCR access token, valid for {}s", lifetime.as_secs());
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }
}

fn sign_assertion(key: &ServiceAccountKey) -> Result<String, OcrError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| OcrError::Internal(e.to_string()))?
        .as_secs();
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: VISION_SCOPE,
        aud: &key.token_uri,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };
    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| OcrError::Auth(format!("invalid private key: {e}")))?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
        .map_err(|e| OcrError::Auth(format!("signing failed: {e}")))
}

#[async_trait]
impl TextDetector for VisionClient {
    async fn detect_text(&self, image: Bytes) -> Result<OcrResponse, OcrError> {
        let key = self.key.as_ref().ok_or_else(|| OcrError::NotConfigured {
            hint: "set CGP_KEYFILE to a service-account key file".into(),
        })?;

        debug!("OCR request: {} image bytes", image.len());
        let token = self.access_token(key).await?;

        let request = AnnotateRequest {
            requests: [AnnotateImageRequest {
                image: ImageContent {
                    content: STANDARD.encode(&image),
                },
                features: [Feature {
                    kind: "TEXT_DETECTION",
                }],
            }],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| OcrError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::Transport(format!("HTTP {status}: {body}")));
        }

        let body: AnnotateResponse = response
            .json()
            .await
            .map_err(|e| OcrError::InvalidResponse(e.to_string()))?;

        let result = interpret_response(body)?;
        debug!(
            "OCR found {} annotations ({} chars)",
            result.annotations.len(),
            result.full_text().len()
        );
        Ok(result)
    }

    fn is_ready(&self) -> bool {
        self.key.is_some()
    }
}
