/// Profile HTTP handlers
use actix_middleware::AuthenticatedUser;
use actix_web::{web, HttpResponse};
use error_types::Result;
use uuid::Uuid;

use crate::models::{AvatarPresignRequest, PageQuery, PageRequest, SearchQuery, UpdateProfileRequest};
use crate::services::ProfileService;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/profile")
            .route("/me", web::get().to(get_current_profile))
            .route("/get-profiles", web::get().to(get_profiles))
            .route("/search", web::get().to(search_profiles))
            .route("/update", web::put().to(update_profile))
            .route("/avatar/s3/upload", web::post().to(presign_avatar))
            .route("/{id}/follow", web::post().to(follow_profile))
            .route("/{id}", web::get().to(get_profile_info)),
    )
    .route("/health", web::get().to(health_check));
}

pub async fn get_current_profile(
    service: web::Data<ProfileService>,
    user: AuthenticatedUser,
) -> Result<HttpResponse> {
    let profile = service.current_profile(user.account_id()).await?;
    Ok(HttpResponse::Ok().json(profile))
}

pub async fn get_profile_info(
    service: web::Data<ProfileService>,
    _user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let profile = service.profile_info(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(profile))
}

pub async fn get_profiles(
    service: web::Data<ProfileService>,
    _user: AuthenticatedUser,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse> {
    let page = PageRequest::try_from(query.into_inner())?;
    Ok(HttpResponse::Ok().json(service.list(&page).await?))
}

pub async fn search_profiles(
    service: web::Data<ProfileService>,
    _user: AuthenticatedUser,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(service.search(&query.name).await?))
}

pub async fn follow_profile(
    service: web::Data<ProfileService>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let edge = service.follow(user.account_id(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(edge))
}

pub async fn update_profile(
    service: web::Data<ProfileService>,
    user: AuthenticatedUser,
    payload: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse> {
    let profile = service.update(user.account_id(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(profile))
}

pub async fn presign_avatar(
    service: web::Data<ProfileService>,
    user: AuthenticatedUser,
    payload: web::Json<AvatarPresignRequest>,
) -> Result<HttpResponse> {
    let presign = service.presign_avatar(user.account_id(), &payload).await?;
    Ok(HttpResponse::Ok().json(presign))
}

pub async fn health_check() -> &'static str {
    "OK"
}
