/// Post HTTP handlers
use actix_middleware::AuthenticatedUser;
use actix_web::{web, HttpResponse};
use error_types::Result;
use uuid::Uuid;

use crate::models::{CommentQuery, CreatePostRequest, PageQuery, PageRequest};
use crate::services::PostService;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/create", web::post().to(create_post))
        .route("/feeds", web::get().to(feeds))
        .route("/user/me", web::get().to(my_posts))
        .route("/user/{profile_id}", web::get().to(profile_posts))
        .route("/{id}/like", web::post().to(like))
        .route("/{id}/dislike", web::post().to(dislike))
        .route("/{id}/comment", web::post().to(comment));
}

pub async fn create_post(
    service: web::Data<PostService>,
    user: AuthenticatedUser,
    payload: web::Json<CreatePostRequest>,
) -> Result<HttpResponse> {
    let post = service.create_post(user.account_id(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

pub async fn feeds(
    service: web::Data<PostService>,
    user: AuthenticatedUser,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse> {
    let page = PageRequest::try_from(query.into_inner())?;
    Ok(HttpResponse::Ok().json(service.feed(user.account_id(), &page).await?))
}

pub async fn my_posts(
    service: web::Data<PostService>,
    user: AuthenticatedUser,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse> {
    let page = PageRequest::try_from(query.into_inner())?;
    let posts = service
        .posts_of(user.account_id(), user.account_id(), &page)
        .await?;
    Ok(HttpResponse::Ok().json(posts))
}

pub async fn profile_posts(
    service: web::Data<PostService>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse> {
    let page = PageRequest::try_from(query.into_inner())?;
    let posts = service
        .posts_of(user.account_id(), path.into_inner(), &page)
        .await?;
    Ok(HttpResponse::Ok().json(posts))
}

pub async fn like(
    service: web::Data<PostService>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    service.like(path.into_inner(), user.account_id()).await?;
    Ok(HttpResponse::Ok().finish())
}

pub async fn dislike(
    service: web::Data<PostService>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    service.dislike(path.into_inner(), user.account_id()).await?;
    Ok(HttpResponse::Ok().finish())
}

pub async fn comment(
    service: web::Data<PostService>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    query: web::Query<CommentQuery>,
) -> Result<HttpResponse> {
    service
        .comment(path.into_inner(), user.account_id(), &query.content)
        .await?;
    Ok(HttpResponse::Ok().finish())
}
