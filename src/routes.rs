use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};

use crate::auth::Auth;
use crate::comments::{create_comment, story_forest};
use crate::error::ApiError;
use crate::models::*;
use crate::repo::Repo;
use crate::stats::VisitorStats;
use crate::submit::submit_story;
use crate::vote::{cast_comment_vote, cast_story_vote, VoteKind};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::resource("/stories")
                    .route(web::get().to(list_stories))
                    .route(web::post().to(create_story)),
            )
            .service(
                web::resource("/stories/{id}")
                    .route(web::get().to(get_story))
                    .route(web::patch().to(admin_update_story))
                    .route(web::delete().to(admin_delete_story)),
            )
            .service(web::resource("/stories/{id}/upvote").route(web::post().to(story_upvote)))
            .service(web::resource("/stories/{id}/downvote").route(web::post().to(story_downvote)))
            .service(web::resource("/stories/{id}/flag").route(web::post().to(story_flag)))
            .service(
                web::resource("/stories/{id}/comments").route(web::get().to(get_story_comments)),
            )
            .service(web::resource("/comments").route(web::post().to(post_comment)))
            .service(
                web::resource("/comments/{id}")
                    .route(web::patch().to(admin_update_comment))
                    .route(web::delete().to(admin_delete_comment)),
            )
            .service(web::resource("/comments/{id}/upvote").route(web::post().to(comment_upvote)))
            .service(
                web::resource("/comments/{id}/downvote").route(web::post().to(comment_downvote)),
            )
            .service(web::resource("/comments/{id}/flag").route(web::post().to(comment_flag)))
            .service(web::resource("/users/{id}").route(web::get().to(get_user)))
            .service(web::resource("/admin/users").route(web::post().to(admin_create_user))),
    );
    cfg.route("/stats/users/count", web::get().to(user_count));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub stats: VisitorStats,
}

/// Caller IP for the anonymised ledger hash, honouring X-Forwarded-For.
fn client_ip(req: &HttpRequest) -> String {
    req.headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.peer_addr().map(|a| a.to_string()))
        .unwrap_or_default()
}

fn user_agent(req: &HttpRequest) -> String {
    req.headers()
        .get("User-Agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[derive(serde::Deserialize)]
pub struct StoryListQuery {
    pub order: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/stories",
    params(("order" = Option<String>, Query, description = "rank (default) or newest")),
    responses(
        (status = 200, description = "Stories in rank order", body = [Story])
    )
)]
pub async fn list_stories(
    req: HttpRequest,
    data: web::Data<AppState>,
    q: web::Query<StoryListQuery>,
) -> Result<HttpResponse, ApiError> {
    data.stats.register_hit(&client_ip(&req), &user_agent(&req));
    let mut stories = data.repo.list_stories().await?;
    if q.order.as_deref() == Some("newest") {
        stories.sort_by(|a, b| b.id.cmp(&a.id));
    }
    Ok(HttpResponse::Ok().json(stories))
}

#[utoipa::path(
    post,
    path = "/api/v1/stories",
    request_body = NewStory,
    responses(
        (status = 201, description = "Story created, or existing duplicate upvoted", body = Story),
        (status = 400, description = "Invalid name or URL"),
        (status = 401, description = "Insufficient karma")
    )
)]
pub async fn create_story(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewStory>,
) -> Result<HttpResponse, ApiError> {
    let user_id = auth.0.user_id()?;
    let ip = client_ip(&req);
    let story = submit_story(data.repo.as_ref(), payload.into_inner(), user_id, &ip).await?;
    Ok(HttpResponse::Created().json(story))
}

#[utoipa::path(
    get,
    path = "/api/v1/stories/{id}",
    params(("id" = Id, Path, description = "Story id")),
    responses(
        (status = 200, description = "Story", body = Story),
        (status = 404, description = "Story not found")
    )
)]
pub async fn get_story(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    data.stats.register_hit(&client_ip(&req), &user_agent(&req));
    let story = data.repo.get_story(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(story))
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct VoteResponse {
    pub points: i64,
}

async fn story_vote(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    kind: VoteKind,
) -> Result<HttpResponse, ApiError> {
    let voter_id = auth.0.user_id()?;
    let ip = client_ip(&req);
    let points =
        cast_story_vote(data.repo.as_ref(), path.into_inner(), voter_id, &ip, kind).await?;
    Ok(HttpResponse::Ok().json(VoteResponse { points }))
}

#[utoipa::path(
    post,
    path = "/api/v1/stories/{id}/upvote",
    params(("id" = Id, Path, description = "Story id")),
    responses(
        (status = 200, description = "New point total", body = VoteResponse),
        (status = 401, description = "Duplicate vote, hidden item or insufficient karma"),
        (status = 404, description = "Story not found")
    )
)]
pub async fn story_upvote(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    story_vote(req, auth, data, path, VoteKind::Up).await
}

pub async fn story_downvote(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    story_vote(req, auth, data, path, VoteKind::Down).await
}

pub async fn story_flag(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    story_vote(req, auth, data, path, VoteKind::Flag).await
}

#[derive(serde::Deserialize)]
pub struct ForestQuery {
    pub min_points: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/stories/{id}/comments",
    params(
        ("id" = Id, Path, description = "Story id"),
        ("min_points" = Option<i64>, Query,
         description = "Pre-filter: rows below this are dropped, along with their replies")
    ),
    responses(
        (status = 200, description = "Nested comment forest"),
        (status = 404, description = "Story not found")
    )
)]
pub async fn get_story_comments(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    q: web::Query<ForestQuery>,
) -> Result<HttpResponse, ApiError> {
    let forest = story_forest(data.repo.as_ref(), path.into_inner(), q.min_points).await?;
    Ok(HttpResponse::Ok().json(forest))
}

#[utoipa::path(
    post,
    path = "/api/v1/comments",
    request_body = NewComment,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Comment too short or too long"),
        (status = 401, description = "Insufficient karma"),
        (status = 404, description = "Story or parent comment not found")
    )
)]
pub async fn post_comment(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewComment>,
) -> Result<HttpResponse, ApiError> {
    let user_id = auth.0.user_id()?;
    let ip = client_ip(&req);
    let p = payload.into_inner();
    let comment =
        create_comment(data.repo.as_ref(), p.story_id, p.parent_id, p.text, user_id, &ip).await?;
    Ok(HttpResponse::Created().json(comment))
}

async fn comment_vote(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    kind: VoteKind,
) -> Result<HttpResponse, ApiError> {
    let voter_id = auth.0.user_id()?;
    let ip = client_ip(&req);
    let points =
        cast_comment_vote(data.repo.as_ref(), path.into_inner(), voter_id, &ip, kind).await?;
    Ok(HttpResponse::Ok().json(VoteResponse { points }))
}

pub async fn comment_upvote(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    comment_vote(req, auth, data, path, VoteKind::Up).await
}

pub async fn comment_downvote(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    comment_vote(req, auth, data, path, VoteKind::Down).await
}

pub async fn comment_flag(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    comment_vote(req, auth, data, path, VoteKind::Flag).await
}

// ---------------- Admin handlers -----------------------

fn ensure_admin(auth: &Auth) -> Result<(), ApiError> {
    if !auth.0.is_admin() {
        return Err(ApiError::not_authorized("Forbidden", "Admins only"));
    }
    Ok(())
}

#[utoipa::path(
    patch,
    path = "/api/v1/stories/{id}",
    request_body = AdminStoryUpdate,
    params(("id" = Id, Path, description = "Story id")),
    responses(
        (status = 200, description = "Story updated", body = Story),
        (status = 401, description = "Admins only"),
        (status = 404, description = "Story not found")
    )
)]
pub async fn admin_update_story(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<AdminStoryUpdate>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin(&auth)?;
    let story = data
        .repo
        .update_story(path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(story))
}

pub async fn admin_delete_story(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin(&auth)?;
    data.repo.delete_story(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn admin_update_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<AdminCommentUpdate>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin(&auth)?;
    let comment = data
        .repo
        .update_comment(path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(comment))
}

pub async fn admin_delete_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin(&auth)?;
    let comment = data.repo.get_comment(path.into_inner()).await?;
    data.repo.delete_comment(comment.id).await?;
    // Keep the parent story's count honest after removal.
    crate::vote::refresh_comment_count(data.repo.as_ref(), comment.story_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct UserResponse {
    pub id: Id,
    pub name: String,
    pub points: i64,
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 200, description = "User karma", body = UserResponse),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(UserResponse {
        id: user.id,
        name: user.name,
        points: user.points,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users",
    request_body = NewUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 401, description = "Admins only")
    )
)]
pub async fn admin_create_user(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewUser>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin(&auth)?;
    let user = data.repo.create_user(payload.into_inner()).await.map_err(
        |e| match e {
            crate::repo::RepoError::Conflict => {
                ApiError::bad_request("Email taken", "A user with this email already exists")
            }
            e => e.into(),
        },
    )?;
    Ok(HttpResponse::Created().json(user))
}

/// Current-visitor count from the TTL'd stats map.
pub async fn user_count(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "users": data.stats.user_count() }))
}
