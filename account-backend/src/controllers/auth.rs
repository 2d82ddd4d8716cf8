//! Sign in, registration, welcome page and logout.

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{database_error, validation_failed};
use crate::auth::{self, check_password_hash, generate_password_hash};
use crate::db::DbError;
use crate::forms::{field_errors, FieldErrors, LoginForm, RegisterForm, EMAIL_EXISTS};
use crate::models::{NewUser, UserResponse, UserRole, UserStatus};
use crate::AppState;

pub const WELCOME_PATH: &str = "/auth/welcome";
pub const SIGNIN_PATH: &str = "/auth/signin";

const LOGIN_FAILED: &str = "Login unsuccessful, Please check email and password";

#[derive(Debug, Deserialize)]
struct SigninQuery {
    next: Option<String>,
}

#[derive(Debug, Serialize)]
struct SigninResponse {
    success: bool,
    message: String,
    token: String,
    expires_at: DateTime<Utc>,
    user: UserResponse,
    redirect: String,
}

/// Signed-in visitors hitting sign in / register are sent to the welcome page
fn already_signed_in() -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, WELCOME_PATH))
        .finish()
}

/// Where to go after signing in: `next` if it is a local path, else the welcome page
fn redirect_target(next: Option<&str>) -> String {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => WELCOME_PATH.to_string(),
    }
}

fn internal_error(message: &str) -> HttpResponse {
    HttpResponse::InternalServerError().json(serde_json::json!({
        "success": false,
        "error": message
    }))
}

async fn signin(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<SigninQuery>,
    body: web::Json<LoginForm>,
) -> impl Responder {
    match auth::authenticated_user(&state, &req) {
        Ok(Some(_)) => return already_signed_in(),
        Ok(None) => {}
        Err(resp) => return resp,
    }

    let form = body.into_inner();
    if let Err(e) = form.validate() {
        return validation_failed(field_errors(&e));
    }

    let user = match state.db.find_user_by_email(&form.email) {
        Ok(user) => user,
        Err(e) => return database_error("Failed to look up user", &e),
    };

    let Some(user) = user.filter(|u| u.is_active()) else {
        log::info!("[AUTH] Sign-in rejected for unknown or inactive account {}", form.email);
        return HttpResponse::Unauthorized().json(serde_json::json!({
            "success": false,
            "error": LOGIN_FAILED
        }));
    };

    let stored = user.password.clone();
    let password = form.password;
    let verified = match web::block(move || check_password_hash(&stored, &password)).await {
        Ok(ok) => ok,
        Err(e) => {
            log::error!("[AUTH] Password check task failed: {}", e);
            return internal_error("Internal server error");
        }
    };
    if !verified {
        log::info!("[AUTH] Sign-in rejected for user {}: wrong password", user.id);
        return HttpResponse::Unauthorized().json(serde_json::json!({
            "success": false,
            "error": LOGIN_FAILED
        }));
    }

    let session = match state.db.create_session(user.id, state.config.session_ttl()) {
        Ok(session) => session,
        Err(e) => return database_error("Failed to create session", &e),
    };
    log::info!("[AUTH] User {} signed in", user.id);

    HttpResponse::Ok()
        .cookie(auth::session_cookie(&session.token))
        .json(SigninResponse {
            success: true,
            message: format!("Welcome {}", user.name),
            token: session.token,
            expires_at: session.expires_at,
            user: user.into(),
            redirect: redirect_target(query.next.as_deref()),
        })
}

async fn register(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<RegisterForm>,
) -> impl Responder {
    match auth::authenticated_user(&state, &req) {
        Ok(Some(_)) => return already_signed_in(),
        Ok(None) => {}
        Err(resp) => return resp,
    }

    let form = body.into_inner();
    match form.check(&state.db) {
        Ok(Ok(())) => {}
        Ok(Err(errors)) => return validation_failed(errors),
        Err(e) => return database_error("Failed to validate registration", &e),
    }

    let iterations = state.config.password_hash_iterations;
    let password = form.password.clone();
    let hashed = match web::block(move || generate_password_hash(&password, iterations)).await {
        Ok(hash) => hash,
        Err(e) => {
            log::error!("[AUTH] Password hashing task failed: {}", e);
            return internal_error("Internal server error");
        }
    };

    let new_user = NewUser {
        name: form.name,
        email: form.email,
        password: hashed,
        role: UserRole::User,
        status: UserStatus::Active,
    };

    match state.db.create_user(&new_user) {
        Ok(user) => {
            log::info!(
                "[AUTH] Registered user {} <{}> as {}",
                user.id,
                user.email,
                user.role.as_ref()
            );
            HttpResponse::Created().json(serde_json::json!({
                "success": true,
                "message": "you are now registered and can login",
                "redirect": SIGNIN_PATH,
                "user": UserResponse::from(user)
            }))
        }
        Err(DbError::DuplicateEmail(_)) => {
            let mut errors = FieldErrors::new();
            errors.insert("email".to_string(), vec![EMAIL_EXISTS.to_string()]);
            validation_failed(errors)
        }
        Err(e) => database_error("Failed to register user", &e),
    }
}

async fn welcome(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let (_, user) = match auth::require_user(&state, &req) {
        Ok(found) => found,
        Err(resp) => return resp,
    };

    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": format!("Welcome {}", user.name),
        "user": UserResponse::from(user)
    }))
}

/// Always succeeds; signing out without a session is a no-op
async fn logout(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Some(token) = auth::session_token(&req) {
        match state.db.delete_session(&token) {
            Ok(true) => log::info!("[AUTH] Session ended"),
            Ok(false) => {}
            Err(e) => return database_error("Failed to delete session", &e),
        }
    }

    HttpResponse::Ok()
        .cookie(auth::removal_cookie())
        .json(serde_json::json!({
            "success": true,
            "message": "You have been logged out",
            "redirect": "/"
        }))
}

/// Plain resources rather than a `/auth` scope, which would shadow `/auth/account`
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource(SIGNIN_PATH).route(web::post().to(signin)))
        .service(web::resource("/auth/register").route(web::post().to(register)))
        .service(web::resource(WELCOME_PATH).route(web::get().to(welcome)))
        .service(
            web::resource("/auth/logout")
                .route(web::get().to(logout))
                .route(web::post().to(logout)),
        );
}
