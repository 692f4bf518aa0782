//! Chat socket for one conversation
//!
//! `GET /message/ws?conversationId=` arrives without gateway identity
//! headers, so the handshake validates the `AccessToken` cookie itself.
//! After the upgrade the socket only receives: every message stored in the
//! conversation is pushed as a `ChatMessageDto` text frame, in `seq` order.

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use crypto_core::{TokenKind, TokenService, ACCESS_TOKEN_COOKIE};
use error_types::ServiceError;
use std::time::{Duration, Instant};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{ChatMessageDto, MessagesQuery};
use crate::registry::{ConnectionRegistry, Subscription};
use crate::services::ChatService;

#[derive(Debug, Clone, Copy)]
pub struct WsSettings {
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            client_timeout: Duration::from_secs(30),
        }
    }
}

pub struct ChatSession {
    account_id: Uuid,
    conversation_id: Uuid,
    subscriber_id: Uuid,
    messages: Option<UnboundedReceiverStream<ChatMessageDto>>,
    registry: ConnectionRegistry,
    settings: WsSettings,
    last_heartbeat: Instant,
}

impl ChatSession {
    pub fn new(
        account_id: Uuid,
        subscription: Subscription,
        registry: ConnectionRegistry,
        settings: WsSettings,
    ) -> Self {
        Self {
            account_id,
            conversation_id: subscription.conversation_id,
            subscriber_id: subscription.id,
            messages: Some(UnboundedReceiverStream::new(subscription.receiver)),
            registry,
            settings,
            last_heartbeat: Instant::now(),
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.settings.client_timeout;
        ctx.run_interval(self.settings.heartbeat_interval, move |session, ctx| {
            if Instant::now().duration_since(session.last_heartbeat) > timeout {
                info!(
                    account_id = %session.account_id,
                    conversation_id = %session.conversation_id,
                    "Chat socket heartbeat timed out"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for ChatSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        if let Some(messages) = self.messages.take() {
            ctx.add_stream(messages);
        }
        self.heartbeat(ctx);
        debug!(
            account_id = %self.account_id,
            conversation_id = %self.conversation_id,
            "Chat socket opened"
        );
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let registry = self.registry.clone();
        let (conversation_id, subscriber_id) = (self.conversation_id, self.subscriber_id);
        actix::spawn(async move {
            registry.unsubscribe(conversation_id, subscriber_id).await;
        });
        debug!(account_id = %self.account_id, %conversation_id, "Chat socket closed");
    }
}

impl StreamHandler<ChatMessageDto> for ChatSession {
    fn handle(&mut self, message: ChatMessageDto, ctx: &mut Self::Context) {
        match serde_json::to_string(&message) {
            Ok(json) => ctx.text(json),
            Err(e) => warn!(error = %e, "Failed to serialize chat message"),
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChatSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(bytes)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&bytes);
            }
            Ok(ws::Message::Pong(_)) => self.last_heartbeat = Instant::now(),
            // sending goes through POST /message/chat.send
            Ok(ws::Message::Text(_)) | Ok(ws::Message::Binary(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received continuation frame, closing chat socket");
                ctx.stop();
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                warn!(error = %e, "Chat socket protocol error");
                ctx.stop();
            }
        }
    }
}

/// Principal from the `AccessToken` cookie.
pub fn principal_from_cookie(req: &HttpRequest, tokens: &TokenService) -> Result<Uuid, ServiceError> {
    let cookie = req
        .cookie(ACCESS_TOKEN_COOKIE)
        .filter(|c| !c.value().is_empty())
        .ok_or(ServiceError::Unauthenticated)?;
    let principal = tokens.validate(cookie.value(), TokenKind::Access)?;
    Ok(principal.account_id)
}

pub async fn chat_ws(
    req: HttpRequest,
    payload: web::Payload,
    query: web::Query<MessagesQuery>,
    service: web::Data<ChatService>,
    tokens: web::Data<TokenService>,
    settings: web::Data<WsSettings>,
) -> actix_web::Result<HttpResponse> {
    let account_id = principal_from_cookie(&req, &tokens).map_err(|e| {
        warn!(error = %e, "Chat socket handshake rejected");
        e
    })?;
    let subscription = service.subscribe(account_id, query.conversation_id).await?;

    info!(%account_id, conversation_id = %query.conversation_id, "Chat socket upgrading");
    let session = ChatSession::new(
        account_id,
        subscription,
        service.registry().clone(),
        **settings,
    );
    ws::start(session, &req, payload)
}
