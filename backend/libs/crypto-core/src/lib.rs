//! Token issuing/validation and the identity types passed between the edge
//! gateway and internal services.

pub mod identity;
pub mod jwt;

pub use identity::{Principal, Role, UnknownRole};
pub use jwt::{
    TokenError, TokenKind, TokenService, TokenSettings, ACCESS_TOKEN_COOKIE,
    REFRESH_TOKEN_COOKIE,
};
