/// Authentication handlers
use actix_web::{web, HttpRequest, HttpResponse};

use super::cookies::{expired_cookie, token_cookie, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::{
    error::{AuthError, AuthResult},
    models::{Account, AccountResponse, LoginRequest, RegisterRequest},
    services::{AuthService, IssuedTokens},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/refresh", web::post().to(refresh))
            .route("/logout", web::post().to(logout)),
    )
    .route("/health", web::get().to(health_check));
}

fn authenticated_response(service: &AuthService, account: &Account, tokens: IssuedTokens) -> HttpResponse {
    let ttl = service.tokens();
    HttpResponse::Ok()
        .cookie(token_cookie(
            REFRESH_TOKEN_COOKIE,
            tokens.refresh_token,
            ttl.refresh_ttl_secs(),
        ))
        .cookie(token_cookie(
            ACCESS_TOKEN_COOKIE,
            tokens.access_token,
            ttl.access_ttl_secs(),
        ))
        .json(AccountResponse::from(account))
}

/// Register endpoint handler
pub async fn register(
    service: web::Data<AuthService>,
    payload: web::Json<RegisterRequest>,
) -> AuthResult<HttpResponse> {
    let (account, tokens) = service.register(payload.into_inner()).await?;
    Ok(authenticated_response(&service, &account, tokens))
}

/// Login endpoint handler
pub async fn login(
    service: web::Data<AuthService>,
    payload: web::Json<LoginRequest>,
) -> AuthResult<HttpResponse> {
    let (account, tokens) = service.login(payload.into_inner()).await?;
    Ok(authenticated_response(&service, &account, tokens))
}

/// Rotates both cookies from a valid `RefreshToken` cookie
pub async fn refresh(service: web::Data<AuthService>, req: HttpRequest) -> AuthResult<HttpResponse> {
    let cookie = req
        .cookie(REFRESH_TOKEN_COOKIE)
        .filter(|c| !c.value().is_empty())
        .ok_or(AuthError::InvalidToken)?;

    let (account, tokens) = service.refresh(cookie.value()).await?;
    Ok(authenticated_response(&service, &account, tokens))
}

/// Logout always succeeds and clears both cookies
pub async fn logout() -> HttpResponse {
    HttpResponse::Ok()
        .cookie(expired_cookie(REFRESH_TOKEN_COOKIE))
        .cookie(expired_cookie(ACCESS_TOKEN_COOKIE))
        .finish()
}

pub async fn health_check() -> &'static str {
    "OK"
}
