//! Edge auth in front of a real service: the cookie becomes the principal
//! the service sees.

use actix_middleware::{IdentityHeaders, ACCOUNT_ID_HEADER, ROLE_HEADER};
use actix_web::cookie::Cookie;
use actix_web::{test, web, App};
use api_gateway::EdgeAuth;
use crypto_core::{Principal, Role, ACCESS_TOKEN_COOKIE};
use integration_tests::{token_service, TestCluster};
use std::sync::Arc;
use uuid::Uuid;

macro_rules! profile_app {
    ($cluster:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::from($cluster.profiles.clone()))
                .wrap(IdentityHeaders)
                .wrap(EdgeAuth::new(Arc::new(token_service())))
                .configure(profile_service::handlers::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn access_cookie_resolves_to_the_registered_profile() {
    let cluster = TestCluster::new();
    let id = cluster.register("Erin").await.unwrap();
    cluster.settle().await;
    let app = profile_app!(cluster);

    let token = cluster
        .auth
        .tokens()
        .issue_access(&Principal::new(id, Role::Member))
        .unwrap();
    let req = test::TestRequest::get()
        .uri("/profile/me")
        .cookie(Cookie::new(ACCESS_TOKEN_COOKIE, token))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["id"], id.to_string());
    assert_eq!(body["fullName"], "Erin");
}

#[actix_web::test]
async fn forged_identity_headers_do_not_reach_the_service() {
    let cluster = TestCluster::new();
    let id = cluster.register("Frank").await.unwrap();
    cluster.settle().await;
    let app = profile_app!(cluster);

    let req = test::TestRequest::get()
        .uri("/profile/me")
        .insert_header((ACCOUNT_ID_HEADER, id.to_string()))
        .insert_header((ROLE_HEADER, "Admin"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn invalid_access_cookie_is_rejected_before_the_service() {
    let cluster = TestCluster::new();
    let app = profile_app!(cluster);

    let req = test::TestRequest::get()
        .uri("/profile/me")
        .cookie(Cookie::new(ACCESS_TOKEN_COOKIE, "not-a-jwt"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // a refresh token is not an access token
    let refresh = cluster.auth.tokens().issue_refresh(Uuid::new_v4()).unwrap();
    let req = test::TestRequest::get()
        .uri("/profile/me")
        .cookie(Cookie::new(ACCESS_TOKEN_COOKIE, refresh))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn follow_through_the_edge_uses_the_cookie_principal() {
    let cluster = TestCluster::new();
    let alice = cluster.register("Alice").await.unwrap();
    let bob = cluster.register("Bob").await.unwrap();
    cluster.settle().await;
    let app = profile_app!(cluster);

    let token = token_service()
        .issue_access(&Principal::new(alice, Role::Member))
        .unwrap();
    let req = test::TestRequest::post()
        .uri(&format!("/profile/{bob}/follow"))
        .cookie(Cookie::new(ACCESS_TOKEN_COOKIE, token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let alice_view = cluster.profiles.current_profile(alice).await.unwrap();
    assert_eq!(alice_view.followings, 1);
}
