use actix_middleware::IdentityHeaders;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;

use event_bus::Broker;
use event_schema::topics;
use profile_service::{
    config::Config, consumers::AuthEventsHandler, handlers, repository::PgProfileRepository,
    services::SERVICE_NAME, ProfileService,
};
use s3_utils::{S3Config, S3Storage};
use transactional_outbox::{OutboxConfig, OutboxProcessor, SqlxOutboxRepository};

/// Resolves once the HTTP server has stopped.
async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.changed().await;
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    actix_middleware::telemetry::init_tracing(config.log_format.as_deref());
    info!("Starting profile-service");

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

    let s3_config = S3Config::from_env();
    let storage = S3Storage::from_config(&s3_config).await;
    info!(bucket = %s3_config.bucket, "Object storage configured");

    let repository = Arc::new(PgProfileRepository::new(pool.clone()));
    let service = ProfileService::new(
        repository.clone(),
        Arc::new(storage),
        s3_config.presign_ttl(),
    );

    let broker = Broker::from_env().context("Failed to configure event broker")?;
    let publisher = broker
        .publisher(SERVICE_NAME)
        .context("Failed to create event publisher")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let outbox = OutboxProcessor::new(
        Arc::new(SqlxOutboxRepository::new(pool)),
        publisher,
        OutboxConfig::from_env(),
    );
    let outbox_shutdown = shutdown_rx.clone();
    let outbox_handle = tokio::spawn(async move { outbox.start(stopped(outbox_shutdown)).await });

    let handler = AuthEventsHandler::new(repository);
    let group_id = config.kafka_group_id.clone();
    let consumer_shutdown = shutdown_rx.clone();
    let consumer_handle = tokio::spawn(async move {
        if let Err(e) = broker
            .consume(&group_id, &[topics::AUTH_USER_EVENT], handler, stopped(consumer_shutdown))
            .await
        {
            error!(error = %e, "Auth events consumer failed");
        }
    });

    let service = web::Data::new(service);
    let bind_address = format!("{}:{}", config.server_host, config.server_port);
    info!("HTTP server listening on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .wrap(IdentityHeaders)
            .wrap(TracingLogger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {bind_address}"))?
    .run()
    .await
    .context("HTTP server error")?;

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(outbox_handle, consumer_handle);

    info!("profile-service shut down");
    Ok(())
}
