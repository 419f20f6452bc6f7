//! Supabase Storage over REST.
//!
//! Objects live at `{base}/storage/v1/object/{bucket}/{key}`. Uploads are a
//! `POST` of the raw bytes with the content type set; downloads are an
//! authenticated `GET`. Every key segment is percent-encoded on its own so
//! names with spaces or `#` survive, while `/` still separates folders.

use crate::clients::BlobStore;
use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{StatusCode, Url};
use tracing::debug;

pub struct SupabaseStorage {
    http: reqwest::Client,
    base: Url,
    api_key: String,
}

impl std::fmt::Debug for SupabaseStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseStorage")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl SupabaseStorage {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, StorageError> {
        let base = Url::parse(base_url)
            .map_err(|e| StorageError::Transport(format!("invalid storage URL '{base_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(StorageError::Transport(format!(
                "storage URL '{base_url}' cannot be a base"
            )));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            api_key: api_key.into(),
        })
    }

    /// URL of an object, with each key segment encoded separately.
    pub fn object_url(&self, bucket: &str, key: &str) -> Result<Url, StorageError> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                StorageError::Transport(format!("storage URL '{}' cannot be a base", self.base))
            })?;
            segments
                .pop_if_empty()
                .extend(["storage", "v1", "object", bucket])
                .extend(key.split('/'));
        }
        Ok(url)
    }

    fn authorise(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.api_key).header("apikey", &self.api_key)
    }
}

/// Map a non-2xx response to a [`StorageError`].
///
/// Supabase sometimes reports a missing object as HTTP 400 with a
/// `not_found` body, so the body is inspected as well as the status.
fn classify_failure(status: StatusCode, body: &str, bucket: &str, key: &str) -> StorageError {
    let lower = body.to_ascii_lowercase();
    if status == StatusCode::NOT_FOUND
        || lower.contains("not_found")
        || lower.contains("object not found")
    {
        return StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return StorageError::Unauthorized(body.to_string());
    }
    StorageError::Service {
        status: status.as_u16(),
        message: body.to_string(),
    }
}

#[async_trait]
impl BlobStore for SupabaseStorage {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let url = self.object_url(bucket, key)?;
        debug!("Uploading {} bytes to {}/{}", bytes.len(), bucket, key);

        let response = self
            .authorise(self.http.post(url))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body, bucket, key))
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        let url = self.object_url(bucket, key)?;
        debug!("Downloading {}/{}", bucket, key);

        let response = self
            .authorise(self.http.get(url))
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body, bucket, key));
        }
        response
            .bytes()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))
    }
}
