//! S3-compatible object storage for uploaded videos

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client, Config};
use tracing::{error, info};

use crate::config::StorageConfig;
use crate::error::{CueError, CueResult};

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Key under which an uploaded video named `file_name` is stored
    fn object_key(&self, file_name: &str) -> String;

    async fn upload(&self, key: &str, path: &Path, content_type: &str) -> CueResult<()>;

    /// Time-limited GET URL for `key`
    async fn signed_url(&self, key: &str) -> CueResult<String>;
}

pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
    expiry: Duration,
}

impl S3Storage {
    pub fn new(config: &StorageConfig) -> CueResult<Self> {
        let (Some(access_key), Some(secret_key)) = (
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
        ) else {
            return Err(CueError::Config(
                "storage requires access_key_id and secret_access_key".to_string(),
            ));
        };

        let creds = Credentials::new(access_key, secret_key, None, None, "cuelog");
        let mut builder = Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(creds);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
            expiry: Duration::from_secs(config.url_expiry_secs),
        })
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    fn object_key(&self, file_name: &str) -> String {
        format!("{}{}", self.prefix, file_name)
    }

    async fn upload(&self, key: &str, path: &Path, content_type: &str) -> CueResult<()> {
        let bytes = tokio::fs::read(path).await?;
        let size = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| {
                error!(key, error = %e, "upload failed");
                CueError::Storage(format!("Failed to upload {}: {}", key, e))
            })?;

        info!(bucket = %self.bucket, key, size, "uploaded object");
        Ok(())
    }

    async fn signed_url(&self, key: &str) -> CueResult<String> {
        let presigning = PresigningConfig::expires_in(self.expiry)
            .map_err(|e| CueError::Storage(format!("Invalid URL expiry: {}", e)))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| CueError::Storage(format!("Failed to sign URL for {}: {}", key, e)))?;

        Ok(request.uri().to_string())
    }
}

/// Reject empty keys and path traversal in client-supplied keys
pub fn validate_key(key: &str) -> CueResult<&str> {
    let key = key.trim();
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|part| part == "..") {
        return Err(CueError::Validation("Invalid object key".to_string()));
    }
    Ok(key)
}
