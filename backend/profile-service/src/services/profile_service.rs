/// Profile reads, updates, avatar presigning and following
use error_types::{Result, ServiceError};
use event_schema::{topics, ProfileUpdatedEvent};
use s3_utils::{avatar_key, ObjectStorage, PresignResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use transactional_outbox::OutboxEvent;
use uuid::Uuid;
use validator::Validate;

use crate::domain::{FollowPlan, Relationship};
use crate::models::{
    AvatarPresignRequest, FriendDto, PageRequest, Profile, ProfileDto, ProfileResponse,
    UpdateProfileRequest, SEARCH_LIMIT,
};
use crate::repository::ProfileRepository;

pub const SERVICE_NAME: &str = "profile-service";

#[derive(Clone)]
pub struct ProfileService {
    profiles: Arc<dyn ProfileRepository>,
    storage: Arc<dyn ObjectStorage>,
    presign_ttl: Duration,
}

impl ProfileService {
    pub fn new(
        profiles: Arc<dyn ProfileRepository>,
        storage: Arc<dyn ObjectStorage>,
        presign_ttl: Duration,
    ) -> Self {
        Self {
            profiles,
            storage,
            presign_ttl,
        }
    }

    pub fn repository(&self) -> Arc<dyn ProfileRepository> {
        self.profiles.clone()
    }

    async fn load(&self, id: Uuid) -> Result<Profile> {
        self.profiles
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Profile", id))
    }

    async fn presign(&self, key: Option<&str>) -> Result<Option<String>> {
        match key {
            Some(key) => Ok(Some(self.storage.presign_download(key, self.presign_ttl).await?)),
            None => Ok(None),
        }
    }

    async fn to_dto(&self, profile: Profile) -> Result<ProfileDto> {
        Ok(ProfileDto {
            id: profile.id,
            profile_pic: self.presign(profile.profile_pic.as_deref()).await?,
            nick_name: profile.nick_name,
            full_name: profile.full_name,
            bio: profile.bio,
            address: profile.address,
            phone_number: profile.phone_number,
        })
    }

    /// Profile with following count and friends, avatars presigned.
    async fn to_response(&self, profile: Profile) -> Result<ProfileResponse> {
        let followings = self.profiles.count_followings(profile.id).await?;

        let mut friends = Vec::new();
        for friend in self.profiles.friends(profile.id).await? {
            friends.push(FriendDto {
                id: friend.id,
                profile_pic: self.presign(friend.profile_pic.as_deref()).await?,
                full_name: friend.full_name,
                nick_name: friend.nick_name,
            });
        }

        Ok(ProfileResponse {
            id: profile.id,
            profile_pic: self.presign(profile.profile_pic.as_deref()).await?,
            nick_name: profile.nick_name,
            full_name: profile.full_name,
            bio: profile.bio,
            address: profile.address,
            phone_number: profile.phone_number,
            followings,
            created_at: profile.created_at,
            friends,
        })
    }

    pub async fn current_profile(&self, account_id: Uuid) -> Result<ProfileResponse> {
        let profile = self.load(account_id).await?;
        self.to_response(profile).await
    }

    pub async fn profile_info(&self, profile_id: Uuid) -> Result<ProfileResponse> {
        let profile = self.load(profile_id).await?;
        self.to_response(profile).await
    }

    pub async fn list(&self, page: &PageRequest) -> Result<Vec<ProfileDto>> {
        let mut dtos = Vec::new();
        for profile in self.profiles.list(page).await? {
            dtos.push(self.to_dto(profile).await?);
        }
        Ok(dtos)
    }

    pub async fn search(&self, name: &str) -> Result<Vec<ProfileDto>> {
        let mut dtos = Vec::new();
        for profile in self.profiles.search(name.trim(), SEARCH_LIMIT).await? {
            dtos.push(self.to_dto(profile).await?);
        }
        Ok(dtos)
    }

    /// `subject` follows `target`; returns the subject -> target edge.
    pub async fn follow(&self, subject: Uuid, target: Uuid) -> Result<Relationship> {
        if subject == target {
            return Err(ServiceError::invalid_input("Cannot follow yourself"));
        }

        let plan = self.profiles.follow(subject, target).await?;
        match &plan {
            FollowPlan::Follow(_) => info!(%subject, %target, "Follow request recorded"),
            FollowPlan::BecomeFriends { .. } => info!(%subject, %target, "Follow reciprocated, now friends"),
            FollowPlan::Unchanged(_) => info!(%subject, %target, "Already following"),
        }
        Ok(plan.forward().clone())
    }

    /// Only the owner may update; the change and its `ProfileUpdated` event
    /// commit together.
    pub async fn update(&self, account_id: Uuid, req: UpdateProfileRequest) -> Result<ProfileResponse> {
        if req.id != account_id {
            return Err(ServiceError::forbidden("profiles can only be updated by their owner"));
        }
        req.validate()?;

        if let Some(key) = &req.profile_pic {
            if !key.starts_with(&format!("users/{account_id}/avatar/")) {
                return Err(ServiceError::invalid_input("profilePic must be an avatar key of this account"));
            }
        }

        let envelope = ProfileUpdatedEvent {
            account_id,
            nick_name: req.nick_name.clone(),
            full_name: req.full_name.clone(),
            profile_pic: req.profile_pic.clone(),
        }
        .envelope(SERVICE_NAME);
        let event = OutboxEvent::from_envelope(topics::PROFILE_USER_EVENT, account_id, &envelope)?;

        let profile = self
            .profiles
            .update_with_event(&req, &event)
            .await?
            .ok_or_else(|| ServiceError::not_found("Profile", account_id))?;
        info!(profile_id = %account_id, event_id = %event.id, "Profile updated");

        self.to_response(profile).await
    }

    pub async fn presign_avatar(
        &self,
        account_id: Uuid,
        req: &AvatarPresignRequest,
    ) -> Result<PresignResponse> {
        req.validate()?;

        let key = avatar_key(account_id, &req.file_name);
        let url = self
            .storage
            .presign_upload(&key, &req.content_type, self.presign_ttl)
            .await?;

        Ok(PresignResponse {
            url,
            key,
            expires_in: self.presign_ttl.as_secs(),
        })
    }
}
