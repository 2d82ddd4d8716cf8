pub mod account;
pub mod auth;
pub mod health;
pub mod posts;
pub mod profile_pics;
pub mod users;

use actix_web::error::InternalError;
use actix_web::{web, HttpResponse};
use std::fmt;

use crate::db::DbError;
use crate::forms::FieldErrors;

/// Log a storage failure and turn it into a 500
pub(crate) fn database_error(context: &str, e: &DbError) -> HttpResponse {
    log::error!("{}: {}", context, e);
    HttpResponse::InternalServerError().json(serde_json::json!({
        "success": false,
        "error": format!("Database error: {}", e)
    }))
}

/// Turn an extractor rejection into the usual JSON 400
fn rejected_request<E>(err: E) -> actix_web::Error
where
    E: fmt::Debug + fmt::Display + 'static,
{
    log::debug!("Rejected request: {}", err);
    let response = HttpResponse::BadRequest().json(serde_json::json!({
        "success": false,
        "error": format!("Invalid request: {}", err)
    }));
    InternalError::from_response(err, response).into()
}

/// JSON body, query string and path extractors answer with JSON errors
pub fn config_extractors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| rejected_request(err)))
        .app_data(web::QueryConfig::default().error_handler(|err, _req| rejected_request(err)))
        .app_data(web::PathConfig::default().error_handler(|err, _req| rejected_request(err)));
}

/// 400 carrying per-field validation messages
pub(crate) fn validation_failed(errors: FieldErrors) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({
        "success": false,
        "error": "Validation failed",
        "errors": errors
    }))
}

pub(crate) fn not_found(what: &str) -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({
        "success": false,
        "error": format!("{} not found", what)
    }))
}

pub(crate) fn forbidden(message: &str) -> HttpResponse {
    HttpResponse::Forbidden().json(serde_json::json!({
        "success": false,
        "error": message
    }))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for handler tests

    use actix_web::web;
    use std::sync::Arc;
    use std::time::Instant;
    use tempfile::TempDir;

    use crate::auth::generate_password_hash;
    use crate::avatar::AvatarStore;
    use crate::config::Config;
    use crate::db::Database;
    use crate::models::{NewUser, User, UserRole, UserStatus};
    use crate::AppState;

    pub const TEST_ROUNDS: u32 = 1_000;
    pub const TEST_PASSWORD: &str = "password123";

    /// App state backed by an in-memory database and a temporary avatar directory.
    /// Keep the returned `TempDir` alive for the duration of the test.
    pub fn test_state() -> (web::Data<AppState>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pics = dir.path().join("profile_pics");
        let avatars = AvatarStore::new(&pics);
        avatars.ensure_default().unwrap();

        let config = Config {
            port: 0,
            database_url: ":memory:".to_string(),
            db_pool_size: 1,
            profile_pics_dir: pics,
            session_ttl_hours: 24,
            password_hash_iterations: TEST_ROUNDS,
        };

        let state = web::Data::new(AppState {
            db: Arc::new(Database::in_memory().unwrap()),
            config,
            avatars: Arc::new(avatars),
            started_at: Instant::now(),
        });
        (state, dir)
    }

    pub fn create_test_user(state: &AppState, name: &str, email: &str, role: UserRole) -> User {
        state
            .db
            .create_user(&NewUser {
                name: name.to_string(),
                email: email.to_string(),
                password: generate_password_hash(TEST_PASSWORD, TEST_ROUNDS),
                role,
                status: UserStatus::Active,
            })
            .unwrap()
    }

    /// Bearer header value for a fresh session of `user`
    pub fn bearer_for(state: &AppState, user: &User) -> String {
        let session = state
            .db
            .create_session(user.id, state.config.session_ttl())
            .unwrap();
        format!("Bearer {}", session.token)
    }
}
