/// Account model and request/response bodies
use chrono::{DateTime, Utc};
use crypto_core::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub full_name: String,
    /// Lowercased at registration
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(full_name: String, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            full_name,
            email: normalize_email(&email),
            password_hash,
            role: Role::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// User registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(
        length(min = 1, max = 100, message = "fullName must be 1-100 characters"),
        custom(function = "crate::validators::validate_not_blank")
    )]
    pub full_name: String,
    #[validate(email(message = "Wrong email"))]
    pub email: String,
    #[validate(
        length(min = 6, max = 200, message = "password must be 6-200 characters"),
        custom(function = "crate::validators::validate_password_rules")
    )]
    pub password: String,
}

/// User login request; not validated, every mismatch is a plain 401
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            role: account.role,
        }
    }
}
