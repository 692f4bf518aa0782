// API Gateway Library

pub mod config;
pub mod middleware;
pub mod proxy;

use actix_web::web;

pub use middleware::EdgeAuth;
pub use proxy::ProxyState;

pub async fn health_check() -> &'static str {
    "OK"
}

/// Gateway routes: `/health` locally, everything else proxied.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .default_service(web::to(proxy::forward));
}
