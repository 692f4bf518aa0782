pub mod media;
pub mod posts;

use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/post")
            .configure(media::routes)
            .configure(posts::routes),
    )
    .route("/health", web::get().to(health_check));
}

pub async fn health_check() -> &'static str {
    "OK"
}
