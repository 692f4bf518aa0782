//! Authenticated identity shared by the token service, the edge gateway and
//! every internal service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Capability tag carried in access tokens and the `Role` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Role {
    Admin,
    #[default]
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Member => "Member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// The authenticated identity attached to a request.
///
/// Never persisted: it is rebuilt from an access token at the edge and from
/// trusted headers inside each service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub account_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(account_id: Uuid, role: Role) -> Self {
        Self { account_id, role }
    }

    pub fn member(account_id: Uuid) -> Self {
        Self::new(account_id, Role::Member)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("MEMBER".parse::<Role>().unwrap(), Role::Member);
        assert_eq!(" member ".parse::<Role>().unwrap(), Role::Member);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn unknown_role_is_a_std_error() {
        let err: Box<dyn std::error::Error> = Box::new("root".parse::<Role>().unwrap_err());
        assert_eq!(err.to_string(), "unknown role: root");
    }

    #[test]
    fn role_serializes_with_display_names() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"Admin\"");
        assert_eq!(Role::default(), Role::Member);
    }
}
