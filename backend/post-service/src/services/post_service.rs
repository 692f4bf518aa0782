/// Posts, likes, comments and response assembly
use chrono::Utc;
use error_types::{Result, ServiceError};
use s3_utils::ObjectStorage;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    Comment, CommentDto, CreatePostRequest, Like, LikeDto, MediaDto, PageRequest, Post,
    PostFilter, PostResponse, ProfilePost, ProfilePostDto,
};
use crate::repository::PostRepository;

pub const MAX_COMMENT_LEN: usize = 2000;

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostRepository>,
    storage: Arc<dyn ObjectStorage>,
    presign_ttl: Duration,
}

impl PostService {
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

    async fn author(&self, id: Uuid) -> Result<ProfilePost> {
        self.posts
            .find_profile(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Profile", id))
    }

    async fn post(&self, id: Uuid) -> Result<Post> {
        self.posts
            .find_post(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Post", id))
    }

    async fn profile_dto(&self, profile: &ProfilePost) -> Result<ProfilePostDto> {
        let profile_pic = match &profile.profile_pic {
            Some(key) => Some(self.storage.presign_download(key, self.presign_ttl).await?),
            None => None,
        };
        Ok(ProfilePostDto {
            id: profile.id,
            full_name: profile.full_name.clone(),
            nick_name: profile.nick_name.clone(),
            profile_pic,
        })
    }

    /// Attaches authors, likes, comments and presigned media in a fixed
    /// number of repository calls.
    async fn assemble(&self, posts: Vec<Post>) -> Result<Vec<PostResponse>> {
        if posts.is_empty() {
            return Ok(Vec::new());
        }
        let post_ids: Vec<Uuid> = posts.iter().map(|p| p.id).collect();
        let likes = self.posts.likes_for(&post_ids).await?;
        let comments = self.posts.comments_for(&post_ids).await?;
        let media = self.posts.media_for(&post_ids).await?;

        let mut profile_ids: Vec<Uuid> = posts
            .iter()
            .map(|p| p.profile_id)
            .chain(comments.iter().map(|c| c.profile_id))
            .collect();
        profile_ids.sort();
        profile_ids.dedup();

        let mut profiles: HashMap<Uuid, ProfilePostDto> = HashMap::new();
        for profile in self.posts.find_profiles(&profile_ids).await? {
            profiles.insert(profile.id, self.profile_dto(&profile).await?);
        }
        let profile_of = |id: Uuid| {
            profiles.get(&id).cloned().unwrap_or(ProfilePostDto {
                id,
                full_name: String::new(),
                nick_name: None,
                profile_pic: None,
            })
        };

        let mut media_by_post: HashMap<Uuid, Vec<MediaDto>> = HashMap::new();
        for m in media {
            let url = self.storage.presign_download(&m.key, self.presign_ttl).await?;
            media_by_post.entry(m.post_id).or_default().push(MediaDto {
                id: m.id,
                key: m.key,
                url,
                media_type: m.media_type,
                status: m.status,
            });
        }

        let mut responses = Vec::with_capacity(posts.len());
        for post in posts {
            responses.push(PostResponse {
                id: post.id,
                profile: profile_of(post.profile_id),
                medias: media_by_post.remove(&post.id).unwrap_or_default(),
                likes: likes
                    .iter()
                    .filter(|l| l.post_id == post.id)
                    .map(|l| LikeDto {
                        id: l.id,
                        account_id: l.account_id,
                        created_at: l.created_at,
                    })
                    .collect(),
                comments: comments
                    .iter()
                    .filter(|c| c.post_id == post.id)
                    .map(|c| CommentDto {
                        id: c.id,
                        content: c.content.clone(),
                        created_at: c.created_at,
                        profile: profile_of(c.profile_id),
                    })
                    .collect(),
                content: post.content,
                visibility: post.visibility,
                created_at: post.created_at,
            });
        }
        Ok(responses)
    }

    pub async fn create_post(&self, account_id: Uuid, req: CreatePostRequest) -> Result<PostResponse> {
        req.validate()?;
        // posts can only be written once the author projection has arrived
        self.author(account_id).await?;

        let post = Post::new(account_id, req.content, req.visibility.unwrap_or_default());
        self.posts.create_post(&post).await?;
        info!(post_id = %post.id, profile_id = %account_id, "Post created");

        let mut assembled = self.assemble(vec![post]).await?;
        assembled
            .pop()
            .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("created post vanished")))
    }

    pub async fn feed(&self, viewer: Uuid, page: &PageRequest) -> Result<Vec<PostResponse>> {
        let filter = PostFilter { author: None, viewer };
        let posts = self.posts.list_posts(&filter, page).await?;
        self.assemble(posts).await
    }

    pub async fn posts_of(&self, viewer: Uuid, profile_id: Uuid, page: &PageRequest) -> Result<Vec<PostResponse>> {
        self.author(profile_id).await?;
        let filter = PostFilter {
            author: Some(profile_id),
            viewer,
        };
        let posts = self.posts.list_posts(&filter, page).await?;
        self.assemble(posts).await
    }

    /// Liking twice is a no-op.
    pub async fn like(&self, post_id: Uuid, account_id: Uuid) -> Result<()> {
        self.post(post_id).await?;
        let added = self
            .posts
            .add_like(&Like {
                id: Uuid::new_v4(),
                post_id,
                account_id,
                created_at: Utc::now(),
            })
            .await?;
        if added {
            info!(%post_id, %account_id, "Post liked");
        }
        Ok(())
    }

    pub async fn dislike(&self, post_id: Uuid, account_id: Uuid) -> Result<()> {
        self.post(post_id).await?;
        self.posts.remove_like(post_id, account_id).await?;
        Ok(())
    }

    pub async fn comment(&self, post_id: Uuid, account_id: Uuid, content: &str) -> Result<()> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ServiceError::invalid_input("content must not be empty"));
        }
        if content.chars().count() > MAX_COMMENT_LEN {
            return Err(ServiceError::invalid_input(format!(
                "content must be at most {MAX_COMMENT_LEN} characters"
            )));
        }

        self.post(post_id).await?;
        self.author(account_id).await?;

        self.posts
            .add_comment(&Comment {
                id: Uuid::new_v4(),
                post_id,
                profile_id: account_id,
                content: content.to_string(),
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PostSort, Visibility};
    use crate::repository::MemoryPostRepository;
    use s3_utils::MemoryStorage;

    async fn setup() -> (PostService, MemoryPostRepository, Uuid) {
        let repo = MemoryPostRepository::new();
        let author = Uuid::new_v4();
        repo.upsert_profile(&ProfilePost {
            id: author,
            full_name: "Alice".into(),
            nick_name: None,
            profile_pic: Some("users/a/avatar/p.png".into()),
        })
        .await
        .unwrap();
        let service = PostService::new(
            Arc::new(repo.clone()),
            Arc::new(MemoryStorage::new()),
            Duration::from_secs(900),
        );
        (service, repo, author)
    }

    fn page() -> PageRequest {
        PageRequest {
            page_no: 0,
            size: 10,
            sort: PostSort::CreatedAt,
            ascending: false,
        }
    }

    fn create(content: &str) -> CreatePostRequest {
        CreatePostRequest {
            content: content.into(),
            visibility: None,
        }
    }

    #[tokio::test]
    async fn create_post_requires_author_projection() {
        let (service, _, _) = setup().await;
        let err = service.create_post(Uuid::new_v4(), create("hi")).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { resource: "Profile", .. }));
    }

    #[tokio::test]
    async fn created_post_embeds_presigned_author() {
        let (service, _, author) = setup().await;
        let post = service.create_post(author, create("hello")).await.unwrap();

        assert_eq!(post.visibility, Visibility::Public);
        assert_eq!(post.profile.full_name, "Alice");
        assert!(post.profile.profile_pic.unwrap().starts_with("memory://download/"));
        assert!(post.likes.is_empty());
    }

    #[tokio::test]
    async fn like_twice_counts_once_and_dislike_removes() {
        let (service, _, author) = setup().await;
        let post = service.create_post(author, create("hello")).await.unwrap();
        let fan = Uuid::new_v4();

        service.like(post.id, fan).await.unwrap();
        service.like(post.id, fan).await.unwrap();
        let feed = service.feed(fan, &page()).await.unwrap();
        assert_eq!(feed[0].likes.len(), 1);

        service.dislike(post.id, fan).await.unwrap();
        let feed = service.feed(fan, &page()).await.unwrap();
        assert!(feed[0].likes.is_empty());

        let err = service.dislike(Uuid::new_v4(), fan).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn comments_carry_their_author() {
        let (service, _, author) = setup().await;
        let post = service.create_post(author, create("hello")).await.unwrap();

        let err = service.comment(post.id, author, "   ").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { .. }));

        service.comment(post.id, author, "first!").await.unwrap();
        let posts = service.posts_of(author, author, &page()).await.unwrap();
        assert_eq!(posts[0].comments.len(), 1);
        assert_eq!(posts[0].comments[0].profile.full_name, "Alice");
    }

    #[tokio::test]
    async fn private_posts_stay_with_their_author() {
        let (service, _, author) = setup().await;
        service
            .create_post(
                author,
                CreatePostRequest {
                    content: "secret".into(),
                    visibility: Some(Visibility::Private),
                },
            )
            .await
            .unwrap();
        service.create_post(author, create("public")).await.unwrap();

        assert_eq!(service.feed(author, &page()).await.unwrap().len(), 2);
        let others = service.feed(Uuid::new_v4(), &page()).await.unwrap();
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].content, "public");
    }

    #[tokio::test]
    async fn posts_of_unknown_profile_is_not_found() {
        let (service, _, author) = setup().await;
        let err = service.posts_of(author, Uuid::new_v4(), &page()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }
}
