use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_actix_web::TracingLogger;

use auth_service::{
    config::Config,
    db::PgAccountRepository,
    handlers,
    services::{auth_service::SERVICE_NAME, AuthService},
};
use crypto_core::TokenService;
use event_bus::Broker;
use transactional_outbox::{OutboxConfig, OutboxProcessor, SqlxOutboxRepository};

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    actix_middleware::telemetry::init_tracing(config.log_format.as_deref());
    info!("Starting auth-service");

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

    let tokens = TokenService::from_env().context("Failed to load token keys")?;

    let broker = Broker::from_env().context("Failed to configure event broker")?;
    let publisher = broker
        .publisher(SERVICE_NAME)
        .context("Failed to create event publisher")?;

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let outbox = OutboxProcessor::new(
        Arc::new(SqlxOutboxRepository::new(pool.clone())),
        publisher,
        OutboxConfig::from_env(),
    );
    let outbox_handle = tokio::spawn(async move {
        outbox
            .start(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await;
    });

    let service = web::Data::new(AuthService::new(
        Arc::new(PgAccountRepository::new(pool)),
        tokens,
    ));

    let bind_address = format!("{}:{}", config.server_host, config.server_port);
    info!("HTTP server listening on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .wrap(TracingLogger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {bind_address}"))?
    .run()
    .await
    .context("HTTP server error")?;

    // actix handles SIGINT/SIGTERM; stop the relay once it returns
    let _ = shutdown_tx.send(true);
    if let Err(e) = outbox_handle.await {
        tracing::warn!(error = %e, "Outbox task ended abnormally");
    }

    info!("auth-service shut down");
    Ok(())
}
