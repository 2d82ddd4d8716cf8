use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;
use validator::Validate;

use super::{database_error, forbidden, not_found, validation_failed};
use crate::auth;
use crate::forms::{field_errors, PostForm};
use crate::models::UpdatePostRequest;
use crate::AppState;

#[derive(Debug, Deserialize)]
struct ListPostsQuery {
    author_id: Option<i64>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/posts")
            .route("", web::get().to(list_posts))
            .route("", web::post().to(create_post))
            .route("/{id}", web::get().to(get_post))
            .route("/{id}", web::put().to(update_post))
            .route("/{id}", web::delete().to(delete_post)),
    );
}

async fn list_posts(state: web::Data<AppState>, query: web::Query<ListPostsQuery>) -> impl Responder {
    let posts = match query.author_id {
        Some(author_id) => state.db.list_posts_by_author(author_id),
        None => state.db.list_posts(),
    };

    match posts {
        Ok(posts) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "count": posts.len(),
            "posts": posts
        })),
        Err(e) => database_error("Failed to list posts", &e),
    }
}

async fn get_post(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    match state.db.get_post(path.into_inner()) {
        Ok(Some(post)) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "post": post
        })),
        Ok(None) => not_found("Post"),
        Err(e) => database_error("Failed to get post", &e),
    }
}

async fn create_post(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<PostForm>,
) -> impl Responder {
    let (_, user) = match auth::require_user(&state, &req) {
        Ok(found) => found,
        Err(resp) => return resp,
    };

    if let Err(e) = body.validate() {
        return validation_failed(field_errors(&e));
    }

    match state.db.create_post(user.id, &body.title, &body.content) {
        Ok(post) => {
            log::info!("[POSTS] User {} created post {}", user.id, post.id);
            HttpResponse::Created().json(serde_json::json!({
                "success": true,
                "post": post
            }))
        }
        Err(e) => database_error("Failed to create post", &e),
    }
}

async fn update_post(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<UpdatePostRequest>,
) -> impl Responder {
    let (_, user) = match auth::require_user(&state, &req) {
        Ok(found) => found,
        Err(resp) => return resp,
    };

    let id = path.into_inner();
    let existing = match state.db.get_post(id) {
        Ok(Some(post)) => post,
        Ok(None) => return not_found("Post"),
        Err(e) => return database_error("Failed to get post", &e),
    };
    if existing.author_id != user.id {
        return forbidden("Only the author can edit this post");
    }

    // Fields left out keep their current value and are validated as such
    let merged = PostForm {
        title: body.title.clone().unwrap_or(existing.title),
        content: body.content.clone().unwrap_or(existing.content),
    };
    if let Err(e) = merged.validate() {
        return validation_failed(field_errors(&e));
    }

    match state
        .db
        .update_post(id, body.title.as_deref(), body.content.as_deref())
    {
        Ok(Some(post)) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "post": post
        })),
        Ok(None) => not_found("Post"),
        Err(e) => database_error("Failed to update post", &e),
    }
}

async fn delete_post(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    let (_, user) = match auth::require_user(&state, &req) {
        Ok(found) => found,
        Err(resp) => return resp,
    };

    let id = path.into_inner();
    let existing = match state.db.get_post(id) {
        Ok(Some(post)) => post,
        Ok(None) => return not_found("Post"),
        Err(e) => return database_error("Failed to get post", &e),
    };
    if existing.author_id != user.id && !user.is_admin() {
        return forbidden("Only the author or an admin can delete this post");
    }

    match state.db.delete_post(id) {
        Ok(true) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Post deleted"
        })),
        Ok(false) => not_found("Post"),
        Err(e) => database_error("Failed to delete post", &e),
    }
}
