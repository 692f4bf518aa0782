/// Profile model and request/response bodies
use chrono::{DateTime, Utc};
use error_types::ServiceError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub const MAX_PAGE_SIZE: i64 = 100;
pub const SEARCH_LIMIT: i64 = 50;

/// Authoritative profile, keyed by account id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    pub nick_name: Option<String>,
    pub address: Option<String>,
    pub bio: Option<String>,
    pub phone_number: Option<String>,
    /// Object key, presigned on the way out
    pub profile_pic: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn registered(id: Uuid, full_name: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            full_name,
            nick_name: None,
            address: None,
            bio: None,
            phone_number: None,
            profile_pic: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields written by `PUT /profile/update`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub id: Uuid,
    #[validate(length(max = 50, message = "nickName must be at most 50 characters"))]
    pub nick_name: Option<String>,
    #[validate(length(min = 1, max = 100, message = "fullName must be 1-100 characters"))]
    pub full_name: String,
    #[validate(length(max = 255, message = "address must be at most 255 characters"))]
    pub address: Option<String>,
    #[validate(length(max = 500, message = "bio must be at most 500 characters"))]
    pub bio: Option<String>,
    #[validate(length(max = 20, message = "phoneNumber must be at most 20 characters"))]
    pub phone_number: Option<String>,
    pub profile_pic: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FriendDto {
    pub id: Uuid,
    pub full_name: String,
    pub nick_name: Option<String>,
    pub profile_pic: Option<String>,
}

/// List and search entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDto {
    pub id: Uuid,
    pub nick_name: Option<String>,
    pub full_name: String,
    pub bio: Option<String>,
    pub profile_pic: Option<String>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: Uuid,
    pub nick_name: Option<String>,
    pub full_name: String,
    pub bio: Option<String>,
    pub profile_pic: Option<String>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    pub followings: i64,
    pub created_at: DateTime<Utc>,
    pub friends: Vec<FriendDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AvatarPresignRequest {
    #[validate(length(min = 1, max = 255, message = "fileName is required"))]
    pub file_name: String,
    #[validate(length(min = 1, max = 100, message = "contentType is required"))]
    pub content_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSort {
    CreatedAt,
    FullName,
    NickName,
}

impl ProfileSort {
    pub fn parse(value: &str) -> Result<Self, ServiceError> {
        match value {
            "createdAt" => Ok(ProfileSort::CreatedAt),
            "fullName" => Ok(ProfileSort::FullName),
            "nickName" => Ok(ProfileSort::NickName),
            other => Err(ServiceError::invalid_input(format!(
                "sortBy must be one of createdAt, fullName, nickName (got {other})"
            ))),
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            ProfileSort::CreatedAt => "created_at",
            ProfileSort::FullName => "full_name",
            ProfileSort::NickName => "nick_name",
        }
    }
}

/// Query string of `GET /profile/get-profiles`
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
    pub sort: ProfileSort,
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
            sort: ProfileSort::parse(&query.sort_by)?,
            ascending: query.ascending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(sort_by: &str, size: i64) -> PageQuery {
        PageQuery {
            page_no: 2,
            size,
            sort_by: sort_by.into(),
            ascending: false,
        }
    }

    #[test]
    fn sort_by_is_whitelisted() {
        assert!(PageRequest::try_from(query("fullName", 3)).is_ok());
        let err = PageRequest::try_from(query("password_hash; DROP TABLE", 3)).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { .. }));
    }

    #[test]
    fn page_size_is_capped() {
        let page = PageRequest::try_from(query("createdAt", 10_000)).unwrap();
        assert_eq!(page.size, MAX_PAGE_SIZE);
        assert_eq!(page.offset(), 200);

        let page = PageRequest::try_from(query("createdAt", 0)).unwrap();
        assert_eq!(page.size, 1);
    }

    #[test]
    fn page_offset_past_i64_is_rejected() {
        let mut q = query("createdAt", 3);
        q.page_no = i64::MAX;
        let err = PageRequest::try_from(q).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { .. }));

        let mut q = query("createdAt", 1);
        q.page_no = i64::MAX;
        assert_eq!(PageRequest::try_from(q).unwrap().offset(), i64::MAX);
    }

    #[test]
    fn update_request_reads_camel_case() {
        let id = Uuid::new_v4();
        let req: UpdateProfileRequest = serde_json::from_value(serde_json::json!({
            "id": id,
            "fullName": "Alice",
            "nickName": "ali",
            "phoneNumber": "123"
        }))
        .unwrap();
        assert_eq!(req.id, id);
        assert_eq!(req.nick_name.as_deref(), Some("ali"));
        assert!(req.bio.is_none());
        assert!(req.validate().is_ok());
    }
}
