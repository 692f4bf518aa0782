/// Media presign handlers
use actix_middleware::AuthenticatedUser;
use actix_web::{web, HttpResponse};
use error_types::Result;
use uuid::Uuid;

use crate::models::{ConfirmQuery, MediaKeyRequest, MediaUploadRequest, PageQuery, PageRequest};
use crate::services::MediaService;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/media/s3/upload", web::post().to(presign_uploads))
        .route("/media/s3/download", web::post().to(presign_downloads))
        .route("/media/s3/confirm", web::post().to(confirm_upload))
        .route("/media/user/me", web::get().to(my_media))
        .route("/media/user/{profile_id}", web::get().to(profile_media));
}

pub async fn presign_uploads(
    service: web::Data<MediaService>,
    user: AuthenticatedUser,
    payload: web::Json<Vec<MediaUploadRequest>>,
) -> Result<HttpResponse> {
    let presigned = service
        .presign_uploads(user.account_id(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(presigned))
}

pub async fn presign_downloads(
    service: web::Data<MediaService>,
    _user: AuthenticatedUser,
    payload: web::Json<Vec<MediaKeyRequest>>,
) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(service.presign_downloads(payload.into_inner()).await?))
}

pub async fn confirm_upload(
    service: web::Data<MediaService>,
    user: AuthenticatedUser,
    query: web::Query<ConfirmQuery>,
) -> Result<HttpResponse> {
    service.confirm(user.account_id(), &query.key).await?;
    Ok(HttpResponse::Ok().finish())
}

pub async fn my_media(
    service: web::Data<MediaService>,
    user: AuthenticatedUser,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse> {
    let page = PageRequest::try_from(query.into_inner())?;
    let media = service
        .media_of(user.account_id(), user.account_id(), &page)
        .await?;
    Ok(HttpResponse::Ok().json(media))
}

pub async fn profile_media(
    service: web::Data<MediaService>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse> {
    let page = PageRequest::try_from(query.into_inner())?;
    let media = service
        .media_of(user.account_id(), path.into_inner(), &page)
        .await?;
    Ok(HttpResponse::Ok().json(media))
}
