/// Posts, the author projection, and request/response bodies
use chrono::{DateTime, Utc};
use error_types::ServiceError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

pub const MAX_PAGE_SIZE: i64 = 100;

/// Local copy of a profile, fed by `auth.user.event` and `profile.user.event`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePost {
    pub id: Uuid,
    pub full_name: String,
    pub nick_name: Option<String>,
    pub profile_pic: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    #[default]
    Public,
    Friends,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaStatus {
    Pending,
    Available,
}

macro_rules! str_enum {
    ($ty:ty { $($variant:path => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($variant => $name),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = ServiceError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($variant),)+
                    other => Err(ServiceError::Internal(anyhow::anyhow!(
                        "unexpected {} value {other}",
                        stringify!($ty)
                    ))),
                }
            }
        }
    };
}

str_enum!(Visibility {
    Visibility::Public => "PUBLIC",
    Visibility::Friends => "FRIENDS",
    Visibility::Private => "PRIVATE",
});

str_enum!(MediaStatus {
    MediaStatus::Pending => "PENDING",
    MediaStatus::Available => "AVAILABLE",
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub content: String,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn new(profile_id: Uuid, content: String, visibility: Visibility) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            profile_id,
            content,
            visibility,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Like {
    pub id: Uuid,
    pub post_id: Uuid,
    pub account_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub profile_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub id: Uuid,
    pub post_id: Uuid,
    pub key: String,
    pub media_type: String,
    pub status: MediaStatus,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 5000, message = "content must be 1-5000 characters"))]
    pub content: String,
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentQuery {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MediaUploadRequest {
    #[validate(length(min = 1, max = 255, message = "fileName is required"))]
    pub file_name: String,
    #[validate(length(min = 1, max = 100, message = "contentType is required"))]
    pub content_type: String,
    #[serde(default)]
    pub file_size: u64,
    pub post_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaKeyRequest {
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmQuery {
    pub key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostSort {
    CreatedAt,
    UpdatedAt,
}

impl PostSort {
    /// `id` is accepted as an alias of `createdAt`.
    pub fn parse(value: &str) -> Result<Self, ServiceError> {
        match value {
            "createdAt" | "id" => Ok(PostSort::CreatedAt),
            "updatedAt" => Ok(PostSort::UpdatedAt),
            other => Err(ServiceError::invalid_input(format!(
                "sortBy must be one of createdAt, updatedAt (got {other})"
            ))),
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            PostSort::CreatedAt => "created_at",
            PostSort::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    #[serde(default)]
    pub page_no: i64,
    #[serde(default = "default_page_size")]
    pub size: i64,
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    #[serde(default)]
    pub ascending: bool,
}

fn default_page_size() -> i64 {
    3
}

fn default_sort_by() -> String {
    "createdAt".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page_no: i64,
    pub size: i64,
    pub sort: PostSort,
    pub ascending: bool,
}

impl PageRequest {
    /// Rows to skip; saturates for pages built by hand past `i64::MAX`.
    pub fn offset(&self) -> i64 {
        self.page_no.saturating_mul(self.size)
    }
}

impl TryFrom<PageQuery> for PageRequest {
    type Error = ServiceError;

    fn try_from(query: PageQuery) -> Result<Self, Self::Error> {
        if query.page_no < 0 {
            return Err(ServiceError::invalid_input("pageNo must not be negative"));
        }
        let size = query.size.clamp(1, MAX_PAGE_SIZE);
        if query.page_no.checked_mul(size).is_none() {
            return Err(ServiceError::invalid_input("pageNo is too large"));
        }
        Ok(Self {
            page_no: query.page_no,
            size,
            sort: PostSort::parse(&query.sort_by)?,
            ascending: query.ascending,
        })
    }
}

/// Which posts a listing may return to `viewer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostFilter {
    /// `None` for the global feed
    pub author: Option<Uuid>,
    /// Non-public posts are only listed for their author
    pub viewer: Uuid,
}

impl PostFilter {
    pub fn allows(&self, post: &Post) -> bool {
        self.author.map_or(true, |a| post.profile_id == a)
            && (post.visibility == Visibility::Public || post.profile_id == self.viewer)
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePostDto {
    pub id: Uuid,
    pub full_name: String,
    pub nick_name: Option<String>,
    pub profile_pic: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeDto {
    pub id: Uuid,
    pub account_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDto {
    pub id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub profile: ProfilePostDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDto {
    pub id: Uuid,
    pub key: String,
    pub url: String,
    #[serde(rename = "type")]
    pub media_type: String,
    pub status: MediaStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: Uuid,
    pub profile: ProfilePostDto,
    pub content: String,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub medias: Vec<MediaDto>,
    pub likes: Vec<LikeDto>,
    pub comments: Vec<CommentDto>,
}
