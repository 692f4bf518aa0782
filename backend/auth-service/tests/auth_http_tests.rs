//! HTTP-level tests for the auth endpoints over the in-memory repository.

use actix_web::{cookie::Cookie, dev::ServiceResponse, test, web, App};
use auth_service::{db::MemoryAccountRepository, handlers, AuthService};
use crypto_core::{TokenKind, TokenService, TokenSettings};
use serde_json::{json, Value};
use std::sync::Arc;
use transactional_outbox::MemoryOutbox;

const SECRET: &[u8] = b"integration-secret-that-is-long-enough";

fn service(repo: &MemoryAccountRepository) -> web::Data<AuthService> {
    let tokens = TokenService::hs256(SECRET, TokenSettings::from_secs(900, 86_400));
    web::Data::new(AuthService::new(Arc::new(repo.clone()), tokens))
}

fn cookie<B>(resp: &ServiceResponse<B>, name: &str) -> Option<Cookie<'static>> {
    resp.response()
        .cookies()
        .find(|c| c.name() == name)
        .map(|c| c.into_owned())
}

#[actix_web::test]
async fn register_sets_cookies_and_returns_account() {
    let repo = MemoryAccountRepository::new(MemoryOutbox::new());
    let app = test::init_service(App::new().app_data(service(&repo)).configure(handlers::configure)).await;

    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({
            "fullName": "Alice Liddell",
            "email": "Alice@Example.com",
            "password": "Secret1!"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let access = cookie(&resp, "AccessToken").expect("access cookie");
    assert!(access.http_only().unwrap_or(false));
    assert_eq!(access.max_age().map(|d| d.whole_seconds()), Some(900));
    let refresh = cookie(&resp, "RefreshToken").expect("refresh cookie");
    assert_eq!(refresh.max_age().map(|d| d.whole_seconds()), Some(86_400));

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["role"], "Member");

    let verifier = TokenService::hs256(SECRET, TokenSettings::default());
    let principal = verifier.validate(access.value(), TokenKind::Access).unwrap();
    assert_eq!(principal.account_id.to_string(), body["id"].as_str().unwrap());

    assert_eq!(repo.outbox().pending().await.len(), 1);
}

#[actix_web::test]
async fn duplicate_registration_is_conflict() {
    let repo = MemoryAccountRepository::new(MemoryOutbox::new());
    let app = test::init_service(App::new().app_data(service(&repo)).configure(handlers::configure)).await;

    let payload = json!({"fullName": "Bob", "email": "bob@example.com", "password": "Secret1!"});
    let req = test::TestRequest::post().uri("/auth/register").set_json(&payload).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::post().uri("/auth/register").set_json(&payload).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "EMAIL_ALREADY_EXISTS");
}

#[actix_web::test]
async fn invalid_registration_lists_field_errors() {
    let repo = MemoryAccountRepository::new(MemoryOutbox::new());
    let app = test::init_service(App::new().app_data(service(&repo)).configure(handlers::configure)).await;

    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({"fullName": "Carol", "email": "not-an-email", "password": "short"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "VALIDATION_FAILED");
    let fields: Vec<&str> = body["details"]["field_errors"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["field"].as_str())
        .collect();
    assert!(fields.contains(&"email"));
    assert!(fields.contains(&"password"));
    assert!(repo.outbox().pending().await.is_empty());
}

#[actix_web::test]
async fn login_rejects_bad_credentials_with_401() {
    let repo = MemoryAccountRepository::new(MemoryOutbox::new());
    let app = test::init_service(App::new().app_data(service(&repo)).configure(handlers::configure)).await;

    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({"fullName": "Dave", "email": "dave@example.com", "password": "Secret1!"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({"email": "dave@example.com", "password": "Wrong1!x"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    assert!(cookie(&resp, "AccessToken").is_none());

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({"email": " DAVE@example.com", "password": "Secret1!"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert!(cookie(&resp, "AccessToken").is_some());
}

#[actix_web::test]
async fn refresh_rotates_from_cookie_and_logout_clears() {
    let repo = MemoryAccountRepository::new(MemoryOutbox::new());
    let app = test::init_service(App::new().app_data(service(&repo)).configure(handlers::configure)).await;

    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({"fullName": "Erin", "email": "erin@example.com", "password": "Secret1!"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let refresh = cookie(&resp, "RefreshToken").unwrap();
    let access = cookie(&resp, "AccessToken").unwrap();

    let req = test::TestRequest::post().uri("/auth/refresh").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    // an access token is not accepted as a refresh token
    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .cookie(Cookie::new("RefreshToken", access.value().to_string()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::post().uri("/auth/refresh").cookie(refresh).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert!(cookie(&resp, "AccessToken").is_some());

    let req = test::TestRequest::post().uri("/auth/logout").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let cleared = cookie(&resp, "AccessToken").unwrap();
    assert_eq!(cleared.value(), "");
    assert_eq!(cleared.max_age().map(|d| d.whole_seconds()), Some(0));
}

#[actix_web::test]
async fn health_check_responds() {
    let repo = MemoryAccountRepository::new(MemoryOutbox::new());
    let app = test::init_service(App::new().app_data(service(&repo)).configure(handlers::configure)).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "OK");
}
