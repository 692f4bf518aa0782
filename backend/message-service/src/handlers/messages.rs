use actix_middleware::AuthenticatedUser;
use actix_web::{web, HttpResponse};
use error_types::Result;

use crate::models::{ConversationQuery, MessagesQuery, SendMessageRequest};
use crate::services::ChatService;

pub async fn send_message(
    service: web::Data<ChatService>,
    user: AuthenticatedUser,
    payload: web::Json<SendMessageRequest>,
) -> Result<HttpResponse> {
    let message = service.send(user.account_id(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(message))
}

/// `null` when the two accounts never talked.
pub async fn get_conversation(
    service: web::Data<ChatService>,
    user: AuthenticatedUser,
    query: web::Query<ConversationQuery>,
) -> Result<HttpResponse> {
    let conversation = service
        .conversation_with(user.account_id(), query.receiver_id)
        .await?;
    Ok(HttpResponse::Ok().json(conversation))
}

pub async fn get_messages(
    service: web::Data<ChatService>,
    user: AuthenticatedUser,
    query: web::Query<MessagesQuery>,
) -> Result<HttpResponse> {
    let messages = service
        .messages(user.account_id(), query.conversation_id)
        .await?;
    Ok(HttpResponse::Ok().json(messages))
}
