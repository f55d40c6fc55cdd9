//! Avatar upload rendezvous
//!
//! The request path hands an avatar to a worker task and waits on a oneshot
//! channel for exactly one outcome: the stored object's URL or the reason it
//! was not stored. The wait is bounded, so a stalled storage provider surfaces
//! as a timeout instead of a hung request.
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use super::object_storage::ObjectStore;
use crate::config::{S3Config, UploadConfig};
use crate::metrics;

#[derive(Debug, Clone, Error)]
pub enum UploadError {
    #[error("avatar file is empty")]
    EmptyFile,

    #[error("avatar is {size} bytes, the limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("unsupported avatar type: {0}")]
    UnsupportedType(String),

    #[error("object storage failure: {0}")]
    Storage(String),

    #[error("upload worker stopped without reporting")]
    WorkerLost,

    #[error("upload did not finish within {0:?}")]
    TimedOut(Duration),
}

impl UploadError {
    /// Rejections caused by the file itself rather than the provider
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            UploadError::EmptyFile | UploadError::TooLarge { .. } | UploadError::UnsupportedType(_)
        )
    }
}

/// A file received from a multipart form
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: usize,
    pub allowed_types: Vec<String>,
}

impl From<&UploadConfig> for UploadPolicy {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_bytes: config.max_avatar_bytes,
            allowed_types: config.allowed_content_types.clone(),
        }
    }
}

impl UploadPolicy {
    /// Effective content type of an acceptable file
    pub fn check(&self, file: &UploadedFile) -> Result<String, UploadError> {
        if file.bytes.is_empty() {
            return Err(UploadError::EmptyFile);
        }
        if file.bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge {
                size: file.bytes.len(),
                limit: self.max_bytes,
            });
        }

        // Content sniffing wins over whatever the client declared
        let declared = file
            .content_type
            .as_deref()
            .and_then(|raw| raw.parse::<mime::Mime>().ok())
            .map(|m| m.essence_str().to_string());
        let effective = sniff_image_type(&file.bytes)
            .map(str::to_string)
            .or(declared)
            .ok_or_else(|| UploadError::UnsupportedType("unknown".to_string()))?;

        if self.allowed_types.iter().any(|t| t.eq_ignore_ascii_case(&effective)) {
            Ok(effective)
        } else {
            Err(UploadError::UnsupportedType(effective))
        }
    }
}

fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some("image/png"),
        [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        _ => None,
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

#[derive(Clone)]
pub struct UploadRendezvous {
    store: Arc<dyn ObjectStore>,
    policy: UploadPolicy,
    timeout: Duration,
    default_avatar_url: String,
}

impl UploadRendezvous {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        policy: UploadPolicy,
        timeout: Duration,
        default_avatar_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            policy,
            timeout,
            default_avatar_url: default_avatar_url.into(),
        }
    }

    pub fn from_config(store: Arc<dyn ObjectStore>, upload: &UploadConfig, s3: &S3Config) -> Self {
        Self::new(
            store,
            UploadPolicy::from(upload),
            upload.rendezvous_timeout(),
            s3.default_avatar_url.clone(),
        )
    }

    pub fn default_avatar_url(&self) -> &str {
        &self.default_avatar_url
    }

    pub fn is_default(&self, url: &str) -> bool {
        url == self.default_avatar_url
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    /// Avatar URL for an optional file; no file means the default avatar
    pub async fn resolve(&self, file: Option<UploadedFile>) -> Result<String, UploadError> {
        match file {
            Some(file) => self.submit(file).await,
            None => Ok(self.default_avatar_url.clone()),
        }
    }

    /// Hand `file` to an upload worker and wait for its single outcome
    pub async fn submit(&self, file: UploadedFile) -> Result<String, UploadError> {
        let (result_tx, result_rx) = oneshot::channel();
        let store = self.store.clone();
        let policy = self.policy.clone();

        tokio::spawn(async move {
            let outcome = upload_worker(store.as_ref(), &policy, file).await;

            if let Err(Ok(orphan)) = result_tx.send(outcome) {
                // Caller gave up waiting; nothing will reference this object
                warn!(url = %orphan, "Upload finished after the caller left, removing it");
                if let Err(e) = store.delete(&orphan).await {
                    warn!(url = %orphan, "Failed to remove orphaned upload: {}", e);
                }
            }
        });

        let outcome = match tokio::time::timeout(self.timeout, result_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(UploadError::WorkerLost),
            Err(_) => Err(UploadError::TimedOut(self.timeout)),
        };

        match &outcome {
            Ok(url) => {
                debug!(url = %url, "Avatar stored");
                metrics::record_upload("success");
            }
            Err(e) if e.is_client_error() => metrics::record_upload("rejected"),
            Err(_) => metrics::record_upload("failed"),
        }

        outcome
    }
}

async fn upload_worker(
    store: &dyn ObjectStore,
    policy: &UploadPolicy,
    file: UploadedFile,
) -> Result<String, UploadError> {
    let content_type = policy.check(&file)?;
    let key = format!("avatars/{}.{}", Uuid::new_v4(), extension_for(&content_type));
    store.put(&key, &content_type, file.bytes).await
}
