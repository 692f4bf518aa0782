use async_trait::async_trait;
use error_types::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::PostRepository;
use crate::models::{
    Comment, Like, Media, MediaStatus, PageRequest, Post, PostFilter, PostSort, ProfilePost,
};

#[derive(Default)]
struct State {
    profiles: HashMap<Uuid, ProfilePost>,
    posts: HashMap<Uuid, Post>,
    likes: Vec<Like>,
    comments: Vec<Comment>,
    media: Vec<Media>,
}

#[derive(Clone, Default)]
pub struct MemoryPostRepository {
    state: Arc<RwLock<State>>,
}

impl MemoryPostRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn profile_count(&self) -> usize {
        self.state.read().await.profiles.len()
    }
}

#[async_trait]
impl PostRepository for MemoryPostRepository {
    async fn insert_registered(&self, id: Uuid, full_name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .profiles
            .entry(id)
            .or_insert_with(|| ProfilePost {
                id,
                full_name: full_name.to_string(),
                nick_name: None,
                profile_pic: None,
            });
        Ok(())
    }

    async fn upsert_profile(&self, profile: &ProfilePost) -> Result<()> {
        self.state
            .write()
            .await
            .profiles
            .insert(profile.id, profile.clone());
        Ok(())
    }

    async fn find_profile(&self, id: Uuid) -> Result<Option<ProfilePost>> {
        Ok(self.state.read().await.profiles.get(&id).cloned())
    }

    async fn find_profiles(&self, ids: &[Uuid]) -> Result<Vec<ProfilePost>> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.profiles.get(id).cloned()).collect())
    }

    async fn create_post(&self, post: &Post) -> Result<()> {
        self.state.write().await.posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn find_post(&self, id: Uuid) -> Result<Option<Post>> {
        Ok(self.state.read().await.posts.get(&id).cloned())
    }

    async fn list_posts(&self, filter: &PostFilter, page: &PageRequest) -> Result<Vec<Post>> {
        let state = self.state.read().await;
        let mut posts: Vec<Post> = state
            .posts
            .values()
            .filter(|p| filter.allows(p))
            .cloned()
            .collect();

        posts.sort_by(|a, b| {
            let (ka, kb) = match page.sort {
                PostSort::CreatedAt => (a.created_at, b.created_at),
                PostSort::UpdatedAt => (a.updated_at, b.updated_at),
            };
            let ordered = if page.ascending { ka.cmp(&kb) } else { kb.cmp(&ka) };
            ordered.then(a.id.cmp(&b.id))
        });

        Ok(posts
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.size).unwrap_or(0))
            .collect())
    }

    async fn add_like(&self, like: &Like) -> Result<bool> {
        let mut state = self.state.write().await;
        if state
            .likes
            .iter()
            .any(|l| l.post_id == like.post_id && l.account_id == like.account_id)
        {
            return Ok(false);
        }
        state.likes.push(like.clone());
        Ok(true)
    }

    async fn remove_like(&self, post_id: Uuid, account_id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.likes.len();
        state
            .likes
            .retain(|l| !(l.post_id == post_id && l.account_id == account_id));
        Ok(state.likes.len() < before)
    }

    async fn likes_for(&self, post_ids: &[Uuid]) -> Result<Vec<Like>> {
        let state = self.state.read().await;
        Ok(state
            .likes
            .iter()
            .filter(|l| post_ids.contains(&l.post_id))
            .cloned()
            .collect())
    }

    async fn add_comment(&self, comment: &Comment) -> Result<()> {
        self.state.write().await.comments.push(comment.clone());
        Ok(())
    }

    async fn comments_for(&self, post_ids: &[Uuid]) -> Result<Vec<Comment>> {
        let state = self.state.read().await;
        Ok(state
            .comments
            .iter()
            .filter(|c| post_ids.contains(&c.post_id))
            .cloned()
            .collect())
    }

    async fn add_media(&self, media: &Media) -> Result<()> {
        self.state.write().await.media.push(media.clone());
        Ok(())
    }

    async fn media_for(&self, post_ids: &[Uuid]) -> Result<Vec<Media>> {
        let state = self.state.read().await;
        Ok(state
            .media
            .iter()
            .filter(|m| post_ids.contains(&m.post_id))
            .cloned()
            .collect())
    }

    async fn mark_media_available(&self, key: &str) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for media in state.media.iter_mut().filter(|m| m.key == key) {
            media.status = MediaStatus::Available;
            updated += 1;
        }
        Ok(updated)
    }
}
