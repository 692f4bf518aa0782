pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use error_types::Result;
use uuid::Uuid;

use crate::models::{Comment, Like, Media, PageRequest, Post, PostFilter, ProfilePost};

pub use memory::MemoryPostRepository;
pub use postgres::PgPostRepository;

/// Author projection plus everything attached to posts.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// `auth.user.event`: creates the projection; an existing row, possibly
    /// already updated by `profile.user.event`, is kept.
    async fn insert_registered(&self, id: Uuid, full_name: &str) -> Result<()>;

    /// `profile.user.event`: creates the projection or overwrites it.
    async fn upsert_profile(&self, profile: &ProfilePost) -> Result<()>;

    async fn find_profile(&self, id: Uuid) -> Result<Option<ProfilePost>>;

    async fn find_profiles(&self, ids: &[Uuid]) -> Result<Vec<ProfilePost>>;

    async fn create_post(&self, post: &Post) -> Result<()>;

    async fn find_post(&self, id: Uuid) -> Result<Option<Post>>;

    async fn list_posts(&self, filter: &PostFilter, page: &PageRequest) -> Result<Vec<Post>>;

    /// `false` when the account already liked the post.
    async fn add_like(&self, like: &Like) -> Result<bool>;

    /// `false` when there was no like to remove.
    async fn remove_like(&self, post_id: Uuid, account_id: Uuid) -> Result<bool>;

    async fn likes_for(&self, post_ids: &[Uuid]) -> Result<Vec<Like>>;

    async fn add_comment(&self, comment: &Comment) -> Result<()>;

    /// Oldest first.
    async fn comments_for(&self, post_ids: &[Uuid]) -> Result<Vec<Comment>>;

    async fn add_media(&self, media: &Media) -> Result<()>;

    async fn media_for(&self, post_ids: &[Uuid]) -> Result<Vec<Media>>;

    /// Returns the number of media rows switched to AVAILABLE.
    async fn mark_media_available(&self, key: &str) -> Result<u64>;
}
