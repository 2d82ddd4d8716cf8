//! Password hashing and resolving the logged-in user of a request.

pub mod password;

use actix_web::cookie::{Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};

use crate::models::{Session, User};
use crate::AppState;

pub use password::{check_password_hash, generate_password_hash};

/// Name of the cookie carrying the session token for browser clients
pub const SESSION_COOKIE: &str = "session_token";

/// Session token from `Authorization: Bearer <token>`, falling back to the session cookie
pub fn session_token(req: &HttpRequest) -> Option<String> {
    let bearer = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    bearer.or_else(|| {
        req.cookie(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Cookie handed out on sign-in
pub fn session_cookie(token: &str) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish()
}

/// Cookie that clears the session cookie on the client
pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = session_cookie("");
    cookie.make_removal();
    cookie
}

/// Resolve the request to a live session and its user.
///
/// Returns `Ok(None)` for anonymous requests (no token, unknown or expired token,
/// or the account no longer exists). Only storage failures are errors.
pub fn authenticated_user(
    state: &web::Data<AppState>,
    req: &HttpRequest,
) -> Result<Option<(Session, User)>, HttpResponse> {
    let Some(token) = session_token(req) else {
        return Ok(None);
    };

    let session = match state.db.validate_session(&token, state.config.session_ttl()) {
        Ok(Some(session)) => session,
        Ok(None) => return Ok(None),
        Err(e) => {
            log::error!("[AUTH] Session validation error: {}", e);
            return Err(internal_error());
        }
    };

    match state.db.get_user(session.user_id) {
        Ok(Some(user)) => Ok(Some((session, user))),
        Ok(None) => Ok(None),
        Err(e) => {
            log::error!("[AUTH] Failed to load user {}: {}", session.user_id, e);
            Err(internal_error())
        }
    }
}

/// Login-required guard: like [`authenticated_user`] but anonymous requests get a 401.
pub fn require_user(
    state: &web::Data<AppState>,
    req: &HttpRequest,
) -> Result<(Session, User), HttpResponse> {
    match authenticated_user(state, req)? {
        Some(found) => Ok(found),
        None => {
            let error = if session_token(req).is_some() {
                "Invalid or expired session"
            } else {
                "Please log in to access this page"
            };
            Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "success": false,
                "error": error
            })))
        }
    }
}

fn internal_error() -> HttpResponse {
    HttpResponse::InternalServerError().json(serde_json::json!({
        "success": false,
        "error": "Internal server error"
    }))
}
