//! Best-effort archival of uploads to the object store.
//!
//! The archiver never reports failure to its caller. Every error is logged
//! at `warn` and dropped, so the response a student sees is the same whether
//! or not the upload reached storage.
//!
//! Keys are `{prefix}-{uuid v4}.{ext}`; random ids need no coordination
//! between concurrent requests.

use crate::clients::BlobStore;
use crate::config::ArchiveMode;
use crate::payload::UploadPayload;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct UploadArchiver {
    store: Arc<dyn BlobStore>,
    mode: ArchiveMode,
}

impl UploadArchiver {
    pub fn new(store: Arc<dyn BlobStore>, mode: ArchiveMode) -> Self {
        Self { store, mode }
    }

    /// Object key for a new upload.
    pub fn object_key(prefix: &str, payload: &UploadPayload) -> String {
        format!("{}-{}.{}", prefix, Uuid::new_v4(), payload.kind.extension())
    }

    /// Schedule the upload of `payload` to `bucket`.
    ///
    /// In [`ArchiveMode::Detached`] the upload runs on its own task and this
    /// returns immediately; in [`ArchiveMode::Blocking`] it is awaited. The
    /// result is discarded either way.
    pub async fn archive(&self, payload: &UploadPayload, bucket: &str, prefix: &str) {
        let key = Self::object_key(prefix, payload);
        let store = Arc::clone(&self.store);
        let bucket = bucket.to_string();
        let bytes = payload.bytes.clone();
        let content_type = payload.kind.mime_type();

        let upload = async move {
            match store.upload(&bucket, &key, bytes, content_type).await {
                Ok(()) => info!("Archived upload as {}/{}", bucket, key),
                Err(e) => warn!("Archiving {}/{} failed (ignored): {}", bucket, key, e),
            }
        };

        match self.mode {
            ArchiveMode::Detached => {
                tokio::spawn(upload);
            }
            ArchiveMode::Blocking => upload.await,
        }
    }
}
