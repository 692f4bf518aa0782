/// Object storage shared by Agora services
///
/// Services never stream file bytes themselves: clients upload and download
/// directly against presigned URLs, and services only keep object keys.
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub mod config;

pub use config::S3Config;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to presign request: {0}")]
    Presign(String),

    #[error("Storage request failed: {0}")]
    Request(String),

    #[error("Invalid storage configuration: {0}")]
    Configuration(String),
}

/// Presigned object access.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn presign_upload(&self, key: &str, content_type: &str, ttl: Duration)
        -> StorageResult<String>;

    async fn presign_download(&self, key: &str, ttl: Duration) -> StorageResult<String>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;
}

#[async_trait]
impl<S: ObjectStorage + ?Sized> ObjectStorage for Arc<S> {
    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> StorageResult<String> {
        (**self).presign_upload(key, content_type, ttl).await
    }

    async fn presign_download(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        (**self).presign_download(key, ttl).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        (**self).exists(key).await
    }
}

/// Body returned to clients for every presign request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignResponse {
    pub url: String,
    pub key: String,
    /// Seconds
    pub expires_in: u64,
}

/// `users/{id}/avatar/{uuid}{ext}`
pub fn avatar_key(account_id: Uuid, file_name: &str) -> String {
    format!("users/{}/avatar/{}{}", account_id, Uuid::new_v4(), extension(file_name))
}

/// `users/{id}/uploads/{uuid}{ext}`
pub fn upload_key(account_id: Uuid, file_name: &str) -> String {
    format!("users/{}/uploads/{}{}", account_id, Uuid::new_v4(), extension(file_name))
}

/// Substring from the last `.`, or empty.
fn extension(file_name: &str) -> &str {
    file_name.rfind('.').map(|idx| &file_name[idx..]).unwrap_or("")
}

/// AWS S3 (or S3-compatible) storage.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Builds a client from the default credential chain.
    pub async fn from_config(config: &S3Config) -> Self {
        use aws_sdk_s3::config::Region;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.path_style)
            .build();

        Self::new(Client::from_conf(s3_config), config.bucket.clone())
    }

    fn presigning(ttl: Duration) -> StorageResult<PresigningConfig> {
        PresigningConfig::builder()
            .expires_in(ttl)
            .build()
            .map_err(|e| StorageError::Presign(format!("Failed to create presigning config: {e}")))
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> StorageResult<String> {
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(Self::presigning(ttl)?)
            .await
            .map_err(|e| StorageError::Presign(format!("Failed to presign upload: {e}")))?;

        debug!(key = %key, "Presigned upload URL");
        Ok(request.uri().to_string())
    }

    async fn presign_download(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(Self::presigning(ttl)?)
            .await
            .map_err(|e| StorageError::Presign(format!("Failed to presign download: {e}")))?;

        Ok(request.uri().to_string())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) {
                    return Ok(false);
                }
                let error_msg = format!("{e:?}");
                if error_msg.contains("404") || error_msg.contains("NotFound") {
                    Ok(false)
                } else {
                    Err(StorageError::Request(format!("Failed to check object {key}: {e}")))
                }
            }
        }
    }
}

/// Storage double: URLs are fake and objects exist only after [`MemoryStorage::put`].
#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<RwLock<HashSet<String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a client finishing an upload.
    pub async fn put(&self, key: impl Into<String>) {
        self.objects.write().await.insert(key.into());
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn presign_upload(
        &self,
        key: &str,
        _content_type: &str,
        ttl: Duration,
    ) -> StorageResult<String> {
        Ok(format!("memory://upload/{}?expires={}", key, ttl.as_secs()))
    }

    async fn presign_download(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        Ok(format!("memory://download/{}?expires={}", key, ttl.as_secs()))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.read().await.contains(key))
    }
}
