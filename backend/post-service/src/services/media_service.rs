/// Presigned media uploads attached to posts
use chrono::Utc;
use error_types::{Result, ServiceError};
use s3_utils::{upload_key, ObjectStorage, PresignResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    Media, MediaDto, MediaKeyRequest, MediaStatus, MediaUploadRequest, PageRequest, PostFilter,
};
use crate::repository::PostRepository;

/// 100 MiB
pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Clone)]
pub struct MediaService {
    posts: Arc<dyn PostRepository>,
    storage: Arc<dyn ObjectStorage>,
    presign_ttl: Duration,
}

impl MediaService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        storage: Arc<dyn ObjectStorage>,
        presign_ttl: Duration,
    ) -> Self {
        Self {
            posts,
            storage,
            presign_ttl,
        }
    }

    /// Every request is checked before any media row is written.
    pub async fn presign_uploads(
        &self,
        account_id: Uuid,
        requests: Vec<MediaUploadRequest>,
    ) -> Result<Vec<PresignResponse>> {
        for req in &requests {
            req.validate()?;
            if req.file_size > MAX_UPLOAD_BYTES {
                return Err(ServiceError::invalid_input(format!(
                    "fileSize must be at most {MAX_UPLOAD_BYTES} bytes"
                )));
            }
            let post = self
                .posts
                .find_post(req.post_id)
                .await?
                .ok_or_else(|| ServiceError::not_found("Post", req.post_id))?;
            if post.profile_id != account_id {
                return Err(ServiceError::forbidden("Post belongs to another profile"));
            }
        }

        let mut responses = Vec::with_capacity(requests.len());
        for req in requests {
            let key = upload_key(account_id, &req.file_name);
            self.posts
                .add_media(&Media {
                    id: Uuid::new_v4(),
                    post_id: req.post_id,
                    key: key.clone(),
                    media_type: req.content_type.clone(),
                    status: MediaStatus::Pending,
                    created_at: Utc::now(),
                })
                .await?;

            let url = self
                .storage
                .presign_upload(&key, &req.content_type, self.presign_ttl)
                .await?;
            info!(post_id = %req.post_id, key = %key, "Issued media upload URL");
            responses.push(PresignResponse {
                url,
                key,
                expires_in: self.presign_ttl.as_secs(),
            });
        }
        Ok(responses)
    }

    pub async fn presign_downloads(&self, requests: Vec<MediaKeyRequest>) -> Result<Vec<PresignResponse>> {
        let mut responses = Vec::with_capacity(requests.len());
        for req in requests {
            let url = self.storage.presign_download(&req.key, self.presign_ttl).await?;
            responses.push(PresignResponse {
                url,
                key: req.key,
                expires_in: self.presign_ttl.as_secs(),
            });
        }
        Ok(responses)
    }

    /// Marks the upload AVAILABLE once the object is present in storage.
    pub async fn confirm(&self, account_id: Uuid, key: &str) -> Result<()> {
        if !key.starts_with(&format!("users/{account_id}/uploads/")) {
            return Err(ServiceError::forbidden("Key belongs to another account"));
        }
        if !self.storage.exists(key).await? {
            return Err(ServiceError::not_found("Upload", key));
        }

        let updated = self.posts.mark_media_available(key).await?;
        info!(key, updated, "Media upload confirmed");
        Ok(())
    }

    pub async fn media_of(&self, viewer: Uuid, profile_id: Uuid, page: &PageRequest) -> Result<Vec<MediaDto>> {
        if self.posts.find_profile(profile_id).await?.is_none() {
            return Err(ServiceError::not_found("Profile", profile_id));
        }
        let filter = PostFilter {
            author: Some(profile_id),
            viewer,
        };
        let post_ids: Vec<Uuid> = self
            .posts
            .list_posts(&filter, page)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        let mut media = Vec::new();
        for m in self.posts.media_for(&post_ids).await? {
            let url = self.storage.presign_download(&m.key, self.presign_ttl).await?;
            media.push(MediaDto {
                id: m.id,
                key: m.key,
                url,
                media_type: m.media_type,
                status: m.status,
            });
        }
        Ok(media)
    }
}
