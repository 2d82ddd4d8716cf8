use actix_web::{web, HttpRequest, HttpResponse, Responder};

use super::{database_error, forbidden, not_found};
use crate::auth;
use crate::models::{UserFilter, UserResponse};
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/users")
            .route("", web::get().to(list_users))
            .route("/{id}", web::get().to(get_user))
            .route("/{id}", web::delete().to(delete_user)),
    );
}

/// `?name=&email=&role=&status=`; with no parameters every user is listed
async fn list_users(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<UserFilter>,
) -> impl Responder {
    if let Err(resp) = auth::require_user(&state, &req) {
        return resp;
    }

    let filter = query.into_inner();
    let users = if filter.is_empty() {
        state.db.list_users()
    } else {
        state.db.filter_users(&filter)
    };
    let users = match users {
        Ok(users) => users,
        Err(e) => return database_error("Failed to list users", &e),
    };
    let count = match state.db.count_users(&filter) {
        Ok(count) => count,
        Err(e) => return database_error("Failed to count users", &e),
    };

    let users: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "count": count,
        "users": users
    }))
}

async fn get_user(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    if let Err(resp) = auth::require_user(&state, &req) {
        return resp;
    }

    match state.db.get_user(path.into_inner()) {
        Ok(Some(user)) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "user": UserResponse::from(user)
        })),
        Ok(None) => not_found("User"),
        Err(e) => database_error("Failed to get user", &e),
    }
}

async fn delete_user(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    let (_, current) = match auth::require_user(&state, &req) {
        Ok(found) => found,
        Err(resp) => return resp,
    };

    let id = path.into_inner();
    if current.id != id && !current.is_admin() {
        return forbidden("You can only delete your own account");
    }

    let target = match state.db.get_user(id) {
        Ok(Some(user)) => user,
        Ok(None) => return not_found("User"),
        Err(e) => return database_error("Failed to get user", &e),
    };

    match state.db.delete_user(id) {
        Ok(true) => {
            state.avatars.remove_picture(&target.profile_image);
            log::info!("[USERS] User {} deleted by user {}", id, current.id);
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "message": "User deleted"
            }))
        }
        Ok(false) => not_found("User"),
        Err(e) => database_error("Failed to delete user", &e),
    }
}
