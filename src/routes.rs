use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};

use crate::auth::{Auth, Role};
use crate::bulk::{self, BulkAction};
use crate::error::ApiError;
use crate::models::*;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::Repo;
use crate::require_role;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            // public surface
            .service(web::resource("/posts").route(web::get().to(list_posts)))
            .service(web::resource("/posts/{slug}").route(web::get().to(get_post)))
            .service(
                web::resource("/posts/{slug}/comments")
                    .route(web::get().to(list_post_comments))
                    .route(web::post().to(submit_comment)),
            )
            .service(web::resource("/pages/{slug}").route(web::get().to(get_page)))
            // dashboard surface
            .service(
                web::resource("/admin/content")
                    .route(web::get().to(list_content))
                    .route(web::post().to(create_content)),
            )
            .service(
                web::resource("/admin/content/bulk").route(web::post().to(bulk_content)),
            )
            .service(
                web::resource("/admin/content/{id}")
                    .route(web::patch().to(update_content))
                    .route(web::delete().to(delete_content)),
            )
            .service(web::resource("/admin/content/{id}/trash").route(web::post().to(trash_content)))
            .service(web::resource("/admin/content/{id}/restore").route(web::post().to(restore_content)))
            .service(web::resource("/admin/comments").route(web::get().to(list_comments)))
            .service(web::resource("/admin/comments/bulk").route(web::post().to(bulk_comments)))
            .service(web::resource("/admin/comments/{id}").route(web::delete().to(delete_comment)))
            .service(web::resource("/admin/comments/{id}/approve").route(web::post().to(approve_comment)))
            .service(web::resource("/admin/comments/{id}/unapprove").route(web::post().to(unapprove_comment)))
            .service(web::resource("/admin/comments/{id}/reply").route(web::post().to(reply_comment))),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub limiter: RateLimiterFacade,
}

fn is_admin(auth: &Auth) -> bool {
    auth.0.roles.iter().any(|r| matches!(r, Role::Admin))
}

fn is_staff(auth: &Option<Auth>) -> bool {
    auth.as_ref().map(|a| !a.0.roles.is_empty()).unwrap_or(false)
}

/// Published-post gate shared by the public handlers. Staff may preview
/// drafts with `?preview=1`; trashed content stays hidden from everyone
/// but admins previewing the trash.
fn publicly_visible(item: &ContentItem, req: &HttpRequest, auth: &Option<Auth>) -> bool {
    let want_preview = req.query_string().contains("preview=1");
    if item.is_trashed {
        let admin = auth
            .as_ref()
            .map(|a| a.0.roles.iter().any(|r| matches!(r, Role::Admin)))
            .unwrap_or(false);
        return admin && want_preview;
    }
    item.status == ContentStatus::Published || (is_staff(auth) && want_preview)
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct PublicListQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[utoipa::path(
    get,
    path = "/api/v1/posts",
    params(PublicListQuery),
    responses(
        (status = 200, description = "Published posts, newest first", body = ContentPage)
    )
)]
pub async fn list_posts(
    data: web::Data<AppState>,
    query: web::Query<PublicListQuery>,
) -> Result<HttpResponse, ApiError> {
    let q = ContentQuery {
        kind: Some(ContentKind::Post),
        status: StatusTab::Published,
        category: query.category.clone(),
        month: None,
        search: query.search.clone(),
        page: query.page.unwrap_or(1),
        per_page: query.per_page.unwrap_or(6),
    };
    let page = data.repo.list_content(&q).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{slug}",
    params(("slug" = String, Path, description = "Post slug")),
    responses(
        (status = 200, description = "Post", body = ContentItem),
        (status = 404, description = "Not published, trashed, or unknown")
    )
)]
pub async fn get_post(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let item = data.repo.get_content_by_slug(&path.into_inner()).await?;
    if item.kind != ContentKind::Post || !publicly_visible(&item, &req, &auth) {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::Ok().json(item))
}

pub async fn get_page(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let item = data.repo.get_content_by_slug(&path.into_inner()).await?;
    if item.kind != ContentKind::Page || !publicly_visible(&item, &req, &auth) {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::Ok().json(item))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{slug}/comments",
    params(
        ("slug" = String, Path, description = "Post slug"),
        ("show_all" = Option<bool>, Query, description = "Lift the 10-thread display cap")
    ),
    responses(
        (status = 200, description = "Approved comment threads", body = CommentListing),
        (status = 404, description = "Post not visible")
    )
)]
pub async fn list_post_comments(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let item = data.repo.get_content_by_slug(&path.into_inner()).await?;
    if item.kind != ContentKind::Post || !publicly_visible(&item, &req, &auth) {
        return Err(ApiError::NotFound);
    }
    let show_all = req.query_string().contains("show_all=1");
    let listing = data.repo.list_visible_comments(item.id, show_all).await?;
    Ok(HttpResponse::Ok().json(listing))
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct SubmitCommentRequest {
    pub author_name: String,
    pub author_email: String,
    #[serde(default)]
    pub website: Option<String>,
    pub body: String,
    #[serde(default)]
    pub parent_id: Option<Id>,
}

#[utoipa::path(
    post,
    path = "/api/v1/posts/{slug}/comments",
    request_body = SubmitCommentRequest,
    responses(
        (status = 201, description = "Comment created, awaiting approval", body = Comment),
        (status = 404, description = "Post not visible"),
        (status = 422, description = "Parent comment belongs to a different post"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn submit_comment(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<SubmitCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    let ip = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();
    if !data.limiter.allow_comment(&ip) {
        return Err(ApiError::RateLimited);
    }
    let item = data.repo.get_content_by_slug(&path.into_inner()).await?;
    if item.kind != ContentKind::Post || !publicly_visible(&item, &req, &auth) {
        return Err(ApiError::NotFound);
    }
    let payload = payload.into_inner();
    let comment = data
        .repo
        .submit_comment(NewComment {
            post_id: item.id,
            parent_id: payload.parent_id,
            author_name: payload.author_name,
            author_email: payload.author_email,
            website: payload.website,
            body: payload.body,
        })
        .await?;
    Ok(HttpResponse::Created().json(comment))
}

// ---------------- Dashboard: content -----------------------------

#[utoipa::path(
    get,
    path = "/api/v1/admin/content",
    responses(
        (status = 200, description = "Filtered content listing", body = ContentPage),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_content(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<ContentQuery>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Author | Role::Moderator | Role::Admin);
    let page = data.repo.list_content(&query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/content",
    request_body = NewContent,
    responses(
        (status = 201, description = "Content created", body = ContentItem),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Slug already taken")
    )
)]
pub async fn create_content(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewContent>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Author | Role::Moderator | Role::Admin);
    let mut new = payload.into_inner();
    // attribution comes from the token, never the request body
    new.author_name = auth.0.name.clone();
    let item = data.repo.create_content(new).await?;
    Ok(HttpResponse::Created().json(item))
}

pub async fn update_content(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateContent>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Author | Role::Moderator | Role::Admin);
    let item = data
        .repo
        .update_content(path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(item))
}

pub async fn trash_content(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let item = data.repo.trash_content(path.into_inner(), &auth.0.sub).await?;
    Ok(HttpResponse::Ok().json(item))
}

pub async fn restore_content(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let item = data.repo.restore_content(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(item))
}

pub async fn delete_content(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    data.repo.delete_content(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct BulkRequest {
    pub action: String,
    pub ids: Vec<Id>,
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/content/bulk",
    request_body = BulkRequest,
    responses(
        (status = 200, description = "Bulk action applied", body = BulkOutcome),
        (status = 400, description = "Empty selection or unknown action"),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn bulk_content(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<ContentQuery>,
    payload: web::Json<BulkRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let action: BulkAction = payload
        .action
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("unknown action '{}'", payload.action)))?;
    let outcome =
        bulk::apply_content(data.repo.as_ref(), action, &payload.ids, &auth.0.sub, &query).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

// ---------------- Dashboard: comment moderation -------------------

#[derive(Debug, serde::Deserialize)]
pub struct CommentQueueQuery {
    #[serde(default)]
    pub status: CommentFilter,
}

pub async fn list_comments(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<CommentQueueQuery>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Moderator | Role::Admin);
    let comments = data.repo.list_comments(query.status).await?;
    let counts = data.repo.comment_counts().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "comments": comments,
        "counts": counts,
    })))
}

pub async fn approve_comment(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Moderator | Role::Admin);
    let comment = data.repo.set_comment_approved(path.into_inner(), true).await?;
    Ok(HttpResponse::Ok().json(comment))
}

pub async fn unapprove_comment(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Moderator | Role::Admin);
    let comment = data.repo.set_comment_approved(path.into_inner(), false).await?;
    Ok(HttpResponse::Ok().json(comment))
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct ReplyRequest {
    pub body: String,
}

pub async fn reply_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ReplyRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Moderator | Role::Admin);
    let comment = data
        .repo
        .reply_comment(path.into_inner(), &auth.0.name, &auth.0.email, &payload.body)
        .await?;
    Ok(HttpResponse::Created().json(comment))
}

pub async fn delete_comment(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    data.repo.delete_comment(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn bulk_comments(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<BulkRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let action: BulkAction = payload
        .action
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("unknown action '{}'", payload.action)))?;
    let outcome = bulk::apply_comments(data.repo.as_ref(), action, &payload.ids).await?;
    Ok(HttpResponse::Ok().json(outcome))
}
