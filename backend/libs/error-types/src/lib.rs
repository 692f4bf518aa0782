//! Unified error type for Agora backend services
//!
//! Maps domain failures onto HTTP status codes. Infrastructure failures
//! (database, storage, broker) surface as a generic 500 body; their detail is
//! only written to the log.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use crypto_core::TokenError;
use event_bus::BusError;
use s3_utils::StorageError;
use thiserror::Error;
use transactional_outbox::OutboxError;

pub mod http;

pub use http::{field_errors, FieldError, HttpErrorResponse};

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// No principal on a request that needs one
    #[error("Authentication required")]
    Unauthenticated,

    /// Token rejected by the token service
    #[error("Token rejected: {0}")]
    Token(#[from] TokenError),

    /// Principal present but not allowed to touch the resource
    #[error("Permission denied: {reason}")]
    Forbidden { reason: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Duplicate resource
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Validation failed")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Event error: {0}")]
    Event(#[from] BusError),

    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated | Self::Token(_) => "UNAUTHENTICATED",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::Database(_)
            | Self::Storage(_)
            | Self::Event(_)
            | Self::Outbox(_)
            | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message that is safe to show a client.
    fn public_message(&self) -> String {
        match self {
            Self::Unauthenticated | Self::Token(_) => "Authentication required".to_string(),
            Self::Forbidden { .. } => "Insufficient permissions".to_string(),
            Self::NotFound { resource, .. } => format!("{resource} not found"),
            Self::Conflict { message } | Self::InvalidInput { message } => message.clone(),
            Self::Validation(_) => "Request validation failed".to_string(),
            _ => "Internal server error".to_string(),
        }
    }

    pub fn to_body(&self) -> HttpErrorResponse {
        let body = HttpErrorResponse::new(self.status_code().as_u16(), self.code(), self.public_message());
        match self {
            Self::Validation(errors) => body.with_field_errors(field_errors(errors)),
            _ => body,
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated | Self::Token(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::InvalidInput { .. } | Self::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        HttpResponse::build(status).json(self.to_body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use validator::{ValidationError, ValidationErrors};

    async fn body_of(err: ServiceError) -> serde_json::Value {
        let response = err.error_response();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn status_mapping() {
        assert_eq!(ServiceError::Unauthenticated.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ServiceError::Token(TokenError::ExpiredToken).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ServiceError::forbidden("owner only").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ServiceError::not_found("Post", "1").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ServiceError::conflict("dup").status_code(), StatusCode::CONFLICT);
        assert_eq!(ServiceError::invalid_input("bad").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServiceError::Internal(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[actix_web::test]
    async fn internal_detail_is_not_leaked() {
        let body = body_of(ServiceError::Internal(anyhow::anyhow!("password=hunter2"))).await;
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert_eq!(body["message"], "Internal server error");
        assert!(!body.to_string().contains("hunter2"));
    }

    #[actix_web::test]
    async fn token_errors_render_generic_401() {
        let body = body_of(ServiceError::Token(TokenError::InvalidSignature)).await;
        assert_eq!(body["status"], 401);
        assert_eq!(body["message"], "Authentication required");
    }

    #[actix_web::test]
    async fn validation_errors_carry_field_messages() {
        let mut errors = ValidationErrors::new();
        let mut err = ValidationError::new("email");
        err.message = Some("must be a valid email address".into());
        errors.add("email", err);

        let body = body_of(ServiceError::Validation(errors)).await;
        assert_eq!(body["status"], 400);
        assert_eq!(body["details"]["field_errors"][0]["field"], "email");
        assert_eq!(
            body["details"]["field_errors"][0]["message"],
            "must be a valid email address"
        );
    }
}
