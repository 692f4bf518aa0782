use async_trait::async_trait;
use error_types::Result;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use super::PostRepository;
use crate::models::{Comment, Like, Media, MediaStatus, PageRequest, Post, PostFilter, ProfilePost};

#[derive(Clone)]
pub struct PgPostRepository {
    pool: PgPool,
}

impl PgPostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn profile_from_row(row: &PgRow) -> Result<ProfilePost> {
    Ok(ProfilePost {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        nick_name: row.try_get("nick_name")?,
        profile_pic: row.try_get("profile_pic")?,
    })
}

fn post_from_row(row: &PgRow) -> Result<Post> {
    let visibility: String = row.try_get("visibility")?;
    Ok(Post {
        id: row.try_get("id")?,
        profile_id: row.try_get("profile_id")?,
        content: row.try_get("content")?,
        visibility: visibility.parse()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn media_from_row(row: &PgRow) -> Result<Media> {
    let status: String = row.try_get("status")?;
    Ok(Media {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        key: row.try_get("key")?,
        media_type: row.try_get("type")?,
        status: status.parse()?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl PostRepository for PgPostRepository {
    async fn insert_registered(&self, id: Uuid, full_name: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO profile_posts (id, full_name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(full_name)
        .execute(&self.pool)
        .await?;

        debug!(profile_id = %id, "Registered author ensured");
        Ok(())
    }

    async fn upsert_profile(&self, profile: &ProfilePost) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO profile_posts (id, full_name, nick_name, profile_pic)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                full_name = EXCLUDED.full_name,
                nick_name = EXCLUDED.nick_name,
                profile_pic = EXCLUDED.profile_pic
            "#,
        )
        .bind(profile.id)
        .bind(&profile.full_name)
        .bind(&profile.nick_name)
        .bind(&profile.profile_pic)
        .execute(&self.pool)
        .await?;

        debug!(profile_id = %profile.id, "Upserted author profile");
        Ok(())
    }

    async fn find_profile(&self, id: Uuid) -> Result<Option<ProfilePost>> {
        let row = sqlx::query("SELECT id, full_name, nick_name, profile_pic FROM profile_posts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(profile_from_row).transpose()
    }

    async fn find_profiles(&self, ids: &[Uuid]) -> Result<Vec<ProfilePost>> {
        let rows = sqlx::query(
            "SELECT id, full_name, nick_name, profile_pic FROM profile_posts WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(profile_from_row).collect()
    }

    async fn create_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, profile_id, content, visibility, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(post.id)
        .bind(post.profile_id)
        .bind(&post.content)
        .bind(post.visibility.as_str())
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_post(&self, id: Uuid) -> Result<Option<Post>> {
        let row = sqlx::query(
            "SELECT id, profile_id, content, visibility, created_at, updated_at FROM posts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(post_from_row).transpose()
    }

    async fn list_posts(&self, filter: &PostFilter, page: &PageRequest) -> Result<Vec<Post>> {
        // the column comes from the PostSort whitelist
        let direction = if page.ascending { "ASC" } else { "DESC" };
        let rows = sqlx::query(&format!(
            r#"
            SELECT id, profile_id, content, visibility, created_at, updated_at
            FROM posts
            WHERE ($1::uuid IS NULL OR profile_id = $1)
              AND (visibility = 'PUBLIC' OR profile_id = $2)
            ORDER BY {} {direction}, id
            LIMIT $3 OFFSET $4
            "#,
            page.sort.column()
        ))
        .bind(filter.author)
        .bind(filter.viewer)
        .bind(page.size)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(post_from_row).collect()
    }

    async fn add_like(&self, like: &Like) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO likes (id, post_id, account_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (post_id, account_id) DO NOTHING
            "#,
        )
        .bind(like.id)
        .bind(like.post_id)
        .bind(like.account_id)
        .bind(like.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_like(&self, post_id: Uuid, account_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM likes WHERE post_id = $1 AND account_id = $2")
            .bind(post_id)
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn likes_for(&self, post_ids: &[Uuid]) -> Result<Vec<Like>> {
        let rows = sqlx::query(
            "SELECT id, post_id, account_id, created_at FROM likes WHERE post_id = ANY($1) ORDER BY created_at",
        )
        .bind(post_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Like {
                    id: row.try_get("id")?,
                    post_id: row.try_get("post_id")?,
                    account_id: row.try_get("account_id")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn add_comment(&self, comment: &Comment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO comments (id, post_id, profile_id, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(comment.id)
        .bind(comment.post_id)
        .bind(comment.profile_id)
        .bind(&comment.content)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn comments_for(&self, post_ids: &[Uuid]) -> Result<Vec<Comment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, profile_id, content, created_at
            FROM comments WHERE post_id = ANY($1)
            ORDER BY created_at, id
            "#,
        )
        .bind(post_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Comment {
                    id: row.try_get("id")?,
                    post_id: row.try_get("post_id")?,
                    profile_id: row.try_get("profile_id")?,
                    content: row.try_get("content")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn add_media(&self, media: &Media) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO media (id, post_id, key, type, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(media.id)
        .bind(media.post_id)
        .bind(&media.key)
        .bind(&media.media_type)
        .bind(media.status.as_str())
        .bind(media.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn media_for(&self, post_ids: &[Uuid]) -> Result<Vec<Media>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, key, type, status, created_at
            FROM media WHERE post_id = ANY($1)
            ORDER BY created_at, id
            "#,
        )
        .bind(post_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(media_from_row).collect()
    }

    async fn mark_media_available(&self, key: &str) -> Result<u64> {
        let result = sqlx::query("UPDATE media SET status = $2, updated_at = NOW() WHERE key = $1")
            .bind(key)
            .bind(MediaStatus::Available.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
