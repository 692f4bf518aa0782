pub mod messages;

use actix_web::web;

use crate::ws::chat_ws;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/message")
            .route("/chat.send", web::post().to(messages::send_message))
            .route("/conversation", web::get().to(messages::get_conversation))
            .route("/conversation/messages", web::get().to(messages::get_messages))
            .route("/ws", web::get().to(chat_ws)),
    )
    .route("/health", web::get().to(health_check));
}

pub async fn health_check() -> &'static str {
    "OK"
}
