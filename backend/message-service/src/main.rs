use actix_middleware::CookieIdentity;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use crypto_core::TokenService;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_actix_web::TracingLogger;

use message_service::{
    config::Config, handlers, repository::PgMessageRepository, ws::WsSettings, ChatService,
    ConnectionRegistry,
};

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    actix_middleware::telemetry::init_tracing(config.log_format.as_deref());
    info!("Starting message-service");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations completed");

    // clients reach this listener directly for the socket, so identity
    // comes from the access cookie and never from request headers
    let tokens = Arc::new(TokenService::from_env().context("Failed to load token keys")?);
    let service = web::Data::new(ChatService::new(
        Arc::new(PgMessageRepository::new(pool)),
        ConnectionRegistry::new(),
    ));
    let settings = web::Data::new(WsSettings {
        heartbeat_interval: config.ws_heartbeat_interval,
        client_timeout: config.ws_client_timeout,
    });

    let bind_address = format!("{}:{}", config.server_host, config.server_port);
    info!("HTTP server listening on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(web::Data::from(tokens.clone()))
            .app_data(settings.clone())
            .wrap(CookieIdentity::new(tokens.clone()))
            .wrap(TracingLogger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {bind_address}"))?
    .run()
    .await
    .context("HTTP server error")?;

    info!("message-service shut down");
    Ok(())
}
