use actix_web::{web, HttpResponse};

use crate::avatar::{allowed_extension, is_safe_filename};
use crate::config::PROFILE_PICS_URL_PREFIX;
use crate::AppState;

fn mime_for_ext(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "jpg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Serve a stored profile picture
async fn serve_profile_picture(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let filename = path.into_inner();

    let Some(ext) = allowed_extension(&filename) else {
        return HttpResponse::Forbidden().json(serde_json::json!({
            "error": "Only jpg and png images are served"
        }));
    };

    if !is_safe_filename(&filename) {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Invalid filename"
        }));
    }

    let dir = state.avatars.dir();
    let canonical_dir = match dir.canonicalize() {
        Ok(p) => p,
        Err(_) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": "Profile picture directory not found"
            }));
        }
    };

    let canonical_file = match dir.join(&filename).canonicalize() {
        Ok(p) => p,
        Err(_) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": "File not found"
            }));
        }
    };

    if !canonical_file.starts_with(&canonical_dir) {
        return HttpResponse::Forbidden().json(serde_json::json!({
            "error": "Access denied"
        }));
    }

    match tokio::fs::read(&canonical_file).await {
        Ok(contents) => HttpResponse::Ok()
            .content_type(mime_for_ext(&ext))
            .append_header(("Cache-Control", "public, max-age=300"))
            .body(contents),
        Err(_) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "File not found"
        })),
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope(PROFILE_PICS_URL_PREFIX)
            .route("/{filename}", web::get().to(serve_profile_picture)),
    );
}
