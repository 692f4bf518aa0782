use actix_middleware::CorrelationIdMiddleware;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use crypto_core::TokenService;
use std::sync::Arc;
use tracing::info;
use tracing_actix_web::TracingLogger;

use api_gateway::{config::Config, configure, EdgeAuth, ProxyState};

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    actix_middleware::telemetry::init_tracing(config.log_format.as_deref());
    info!("Starting api-gateway");

    let tokens = Arc::new(TokenService::from_env().context("Failed to load token keys")?);
    let proxy = web::Data::new(
        ProxyState::new(
            config.upstreams.clone(),
            config.chat_ws_url.clone(),
            config.upstream_timeout,
        )
        .context("Failed to build upstream client")?,
    );
    info!(upstreams = ?config.upstreams, "Upstreams configured");

    let bind_address = format!("{}:{}", config.server_host, config.server_port);
    info!("HTTP server listening on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(proxy.clone())
            .wrap(CorrelationIdMiddleware)
            .wrap(TracingLogger::default())
            // registered last so it runs first
            .wrap(EdgeAuth::new(tokens.clone()))
            .configure(configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {bind_address}"))?
    .run()
    .await
    .context("HTTP server error")?;

    info!("api-gateway shut down");
    Ok(())
}
