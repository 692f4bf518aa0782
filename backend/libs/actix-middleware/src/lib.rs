//! # Actix Middleware Library
//!
//! Shared middleware for Agora Actix services
//!
//! ## Modules
//! - `identity`: trusts gateway identity headers and provides the `AuthenticatedUser` extractor
//! - `cookie_identity`: ignores identity headers and authenticates the `AccessToken` cookie,
//!   for listeners that clients reach directly
//! - `correlation_id`: request correlation ids
//! - `telemetry`: tracing subscriber setup for service binaries

pub mod cookie_identity;
pub mod correlation_id;
pub mod identity;
pub mod telemetry;

pub use cookie_identity::CookieIdentity;
pub use correlation_id::{get_correlation_id, CorrelationId, CorrelationIdMiddleware};
pub use identity::{
    principal_from_headers, AuthenticatedUser, IdentityHeaders, ACCOUNT_ID_HEADER, ROLE_HEADER,
};
