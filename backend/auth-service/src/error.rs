use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use error_types::{field_errors, HttpErrorResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email and wrong password are deliberately indistinguishable
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already exists")]
    EmailAlreadyExists,

    /// Refresh cookie missing, invalid, or pointing at a deleted account
    #[error("Invalid token")]
    InvalidToken,

    #[error("Validation failed")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::EmailAlreadyExists => "EMAIL_ALREADY_EXISTS",
            AuthError::InvalidToken => "UNAUTHENTICATED",
            AuthError::Validation(_) => "VALIDATION_FAILED",
            AuthError::Internal(_) | AuthError::Database(_) => "INTERNAL_ERROR",
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "Invalid email or password",
            AuthError::EmailAlreadyExists => "Email already registered",
            AuthError::InvalidToken => "Authentication required",
            AuthError::Validation(_) => "Request validation failed",
            AuthError::Internal(_) | AuthError::Database(_) => "Internal server error",
        }
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::EmailAlreadyExists => StatusCode::CONFLICT,
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::Internal(_) | AuthError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "auth request failed");
        }

        let body = HttpErrorResponse::new(status.as_u16(), self.code(), self.public_message());
        let body = match self {
            AuthError::Validation(errors) => body.with_field_errors(field_errors(errors)),
            _ => body,
        };
        HttpResponse::build(status).json(body)
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::Database(err.to_string())
    }
}

impl From<transactional_outbox::OutboxError> for AuthError {
    fn from(err: transactional_outbox::OutboxError) -> Self {
        AuthError::Internal(format!("outbox: {err}"))
    }
}

impl From<crypto_core::TokenError> for AuthError {
    fn from(err: crypto_core::TokenError) -> Self {
        match err {
            crypto_core::TokenError::SigningUnavailable
            | crypto_core::TokenError::Encoding(_)
            | crypto_core::TokenError::Configuration(_) => AuthError::Internal(err.to_string()),
            _ => AuthError::InvalidToken,
        }
    }
}
