/// Object storage for avatars
use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::debug;

use super::uploads::UploadError;
use crate::config::S3Config;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key` and return its public URL
    async fn put(&self, key: &str, content_type: &str, body: Bytes) -> Result<String, UploadError>;

    /// Remove the object a public URL points at
    async fn delete(&self, url: &str) -> Result<(), UploadError>;
}

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: &str, public_base_url: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build a client from the default credential chain, honouring a custom
    /// endpoint for S3-compatible storage.
    pub async fn from_config(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let shared = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.endpoint.is_some())
            .build();

        Self::new(
            Client::from_conf(s3_config),
            &config.bucket,
            &config.public_base_url,
        )
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    fn key_for(&self, url: &str) -> Option<String> {
        object_key(&self.public_base_url, url)
    }
}

/// Object key behind `url` when it lives under `base`
pub fn object_key(base: &str, url: &str) -> Option<String> {
    url.strip_prefix(base.trim_end_matches('/'))
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|key| !key.is_empty())
        .map(|key| key.split(['?', '#']).next().unwrap_or(key).to_string())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, content_type: &str, body: Bytes) -> Result<String, UploadError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| UploadError::Storage(e.to_string()))?;

        debug!(key, "Uploaded object");
        Ok(self.public_url(key))
    }

    async fn delete(&self, url: &str) -> Result<(), UploadError> {
        let key = self
            .key_for(url)
            .ok_or_else(|| UploadError::Storage(format!("{} is not in this bucket", url)))?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| UploadError::Storage(e.to_string()))?;

        debug!(key, "Deleted object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_from_public_url() {
        let base = "https://cdn.example.com/media";
        assert_eq!(
            object_key(base, "https://cdn.example.com/media/avatars/a.png"),
            Some("avatars/a.png".to_string())
        );
        assert_eq!(
            object_key(base, "https://cdn.example.com/media/avatars/a.png?v=2"),
            Some("avatars/a.png".to_string())
        );
        assert_eq!(object_key(base, "https://elsewhere.example.com/a.png"), None);
        assert_eq!(object_key(base, "https://cdn.example.com/media/"), None);
    }
}
