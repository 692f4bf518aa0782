//! HTTP tests for chat endpoints and the socket handshake.

use actix_middleware::{CookieIdentity, ACCOUNT_ID_HEADER, ROLE_HEADER};
use actix_web::cookie::Cookie;
use actix_web::http::header;
use actix_web::{test, web, App};
use crypto_core::{Principal, TokenService, TokenSettings, ACCESS_TOKEN_COOKIE};
use message_service::repository::MemoryMessageRepository;
use message_service::ws::WsSettings;
use message_service::{handlers, ChatService, ConnectionRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

const SECRET: &[u8] = b"message-service-test-secret-0123456789";

fn state() -> (web::Data<ChatService>, Arc<TokenService>) {
    let service = ChatService::new(Arc::new(MemoryMessageRepository::new()), ConnectionRegistry::new());
    let tokens = TokenService::hs256(SECRET, TokenSettings::default());
    (web::Data::new(service), Arc::new(tokens))
}

macro_rules! app {
    ($service:expr, $tokens:expr) => {
        test::init_service(
            App::new()
                .app_data($service.clone())
                .app_data(web::Data::from($tokens.clone()))
                .app_data(web::Data::new(WsSettings::default()))
                .wrap(CookieIdentity::new($tokens.clone()))
                .configure(handlers::configure),
        )
        .await
    };
}

fn as_user(req: test::TestRequest, tokens: &TokenService, id: Uuid) -> test::TestRequest {
    let token = tokens.issue_access(&Principal::member(id)).unwrap();
    req.cookie(Cookie::new(ACCESS_TOKEN_COOKIE, token))
}

fn forged(req: test::TestRequest, id: Uuid) -> test::TestRequest {
    req.insert_header((ACCOUNT_ID_HEADER, id.to_string()))
        .insert_header((ROLE_HEADER, "Member"))
}

fn upgrade(req: test::TestRequest) -> test::TestRequest {
    req.insert_header((header::UPGRADE, "websocket"))
        .insert_header((header::CONNECTION, "upgrade"))
        .insert_header((header::SEC_WEBSOCKET_VERSION, "13"))
        .insert_header((header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ=="))
}

#[actix_web::test]
async fn send_then_read_conversation() {
    let (service, tokens) = state();
    let app = app!(service, tokens);
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    let req = as_user(test::TestRequest::get().uri(&format!("/message/conversation?receiverId={bob}")), &tokens, alice)
        .to_request();
    let none: Value = test::call_and_read_body_json(&app, req).await;
    assert!(none.is_null());

    for content in ["hi", "how are you"] {
        let req = as_user(test::TestRequest::post().uri("/message/chat.send"), &tokens, alice)
            .set_json(json!({"receiverId": bob, "content": content}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }

    let req = as_user(test::TestRequest::get().uri(&format!("/message/conversation?receiverId={alice}")), &tokens, bob)
        .to_request();
    let conversation: Value = test::call_and_read_body_json(&app, req).await;
    let conversation_id = conversation["id"].as_str().unwrap().to_string();

    let req = as_user(
        test::TestRequest::get().uri(&format!("/message/conversation/messages?conversationId={conversation_id}")),
        &tokens,
        bob,
    )
    .to_request();
    let messages: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(messages[0]["seq"], 1);
    assert_eq!(messages[1]["content"], "how are you");
    assert_eq!(messages[1]["contentType"], "TEXT");

    let req = as_user(
        test::TestRequest::get().uri(&format!("/message/conversation/messages?conversationId={conversation_id}")),
        &tokens,
        Uuid::new_v4(),
    )
    .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn send_requires_principal_and_rejects_self() {
    let (service, tokens) = state();
    let app = app!(service, tokens);
    let me = Uuid::new_v4();

    let req = test::TestRequest::post()
        .uri("/message/chat.send")
        .set_json(json!({"receiverId": me, "content": "hi"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = as_user(test::TestRequest::post().uri("/message/chat.send"), &tokens, me)
        .set_json(json!({"receiverId": me, "content": "hi"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_web::test]
async fn socket_handshake_checks_cookie_and_participant() {
    let (service, tokens) = state();
    let app = app!(service, tokens);
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    let sent = service
        .send(
            alice,
            serde_json::from_value(json!({"receiverId": bob, "content": "hello"})).unwrap(),
        )
        .await
        .unwrap();
    let uri = format!("/message/ws?conversationId={}", sent.conversation_id);

    // identity headers are not enough without the cookie
    let req = upgrade(forged(test::TestRequest::get().uri(&uri), alice)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = upgrade(test::TestRequest::get().uri(&uri))
        .cookie(Cookie::new(ACCESS_TOKEN_COOKIE, "garbage"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let outsider = tokens.issue_access(&Principal::member(Uuid::new_v4())).unwrap();
    let req = upgrade(test::TestRequest::get().uri(&uri))
        .cookie(Cookie::new(ACCESS_TOKEN_COOKIE, outsider))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let token = tokens.issue_access(&Principal::member(bob)).unwrap();
    let req = upgrade(test::TestRequest::get().uri(&uri))
        .cookie(Cookie::new(ACCESS_TOKEN_COOKIE, token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 101);
    assert_eq!(service.registry().subscriber_count(sent.conversation_id).await, 1);
}

#[actix_web::test]
async fn forged_identity_headers_cannot_send_as_someone_else() {
    let (service, tokens) = state();
    let app = app!(service, tokens);
    let (victim, receiver, attacker) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    let req = forged(test::TestRequest::post().uri("/message/chat.send"), victim)
        .set_json(json!({"receiverId": receiver, "content": "not me"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    // a valid cookie of another account wins over the forged headers
    let req = forged(
        as_user(test::TestRequest::post().uri("/message/chat.send"), &tokens, attacker),
        victim,
    )
    .set_json(json!({"receiverId": receiver, "content": "from attacker"}))
    .to_request();
    let sent: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(sent["sender"], attacker.to_string());

    assert!(service.conversation_with(victim, receiver).await.unwrap().is_none());
}
