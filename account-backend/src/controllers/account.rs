//! Account page: view and update name, email and profile picture.

use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use futures_util::StreamExt;

use super::{database_error, not_found, validation_failed};
use crate::auth;
use crate::avatar::{allowed_extension, AvatarError, ALLOWED_EXTENSIONS};
use crate::db::{DbError, DbResult};
use crate::forms::{FieldErrors, UpdateAccountForm, EMAIL_EXISTS};
use crate::models::{User, UserResponse, UserUpdate};
use crate::AppState;

const MAX_PICTURE_SIZE: usize = 5 * 1024 * 1024; // 5MB
const MAX_TEXT_FIELD_SIZE: usize = 1024;

/// Parts of the account form as submitted
#[derive(Debug, Default)]
struct AccountUpload {
    name: String,
    email: String,
    /// (original filename, bytes); absent when no file was chosen
    picture: Option<(String, Vec<u8>)>,
}

fn bad_request(message: String) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({
        "success": false,
        "error": message
    }))
}

async fn read_upload(payload: &mut Multipart) -> Result<AccountUpload, HttpResponse> {
    let mut upload = AccountUpload::default();

    while let Some(item) = payload.next().await {
        let mut field = match item {
            Ok(field) => field,
            Err(e) => return Err(bad_request(format!("Failed to process multipart: {}", e))),
        };

        let field_name = field.name().to_string();
        let limit = match field_name.as_str() {
            "name" | "email" => MAX_TEXT_FIELD_SIZE,
            "profile_picture" => MAX_PICTURE_SIZE,
            _ => continue,
        };
        let filename = field
            .content_disposition()
            .get_filename()
            .map(|s| s.to_string())
            .unwrap_or_default();

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            match chunk {
                Ok(bytes) => {
                    data.extend_from_slice(&bytes);
                    if data.len() > limit {
                        return Err(HttpResponse::PayloadTooLarge().json(serde_json::json!({
                            "success": false,
                            "error": format!("Field '{}' is too large", field_name)
                        })));
                    }
                }
                Err(e) => {
                    return Err(bad_request(format!("Failed to read field '{}': {}", field_name, e)));
                }
            }
        }

        match field_name.as_str() {
            "profile_picture" => {
                // Browsers send an empty part when no file was chosen
                if !filename.is_empty() && !data.is_empty() {
                    upload.picture = Some((filename, data));
                }
            }
            other => {
                let value = match String::from_utf8(data) {
                    Ok(value) => value,
                    Err(_) => return Err(bad_request(format!("Field '{}' is not valid UTF-8", other))),
                };
                if other == "name" {
                    upload.name = value;
                } else {
                    upload.email = value;
                }
            }
        }
    }

    Ok(upload)
}

/// Apply `update` to `user` and delete whichever stored picture is left
/// unreferenced: the previous one on success, the new one otherwise.
fn commit_account_update(
    state: &AppState,
    user: &User,
    update: &UserUpdate,
) -> DbResult<Option<User>> {
    let result = state.db.update_user(user.id, update);
    if let Some(stored) = &update.profile_image {
        match &result {
            Ok(Some(_)) => state.avatars.remove_picture(&user.profile_image),
            _ => state.avatars.remove_picture(stored),
        }
    }
    result
}

async fn account_page(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let (_, user) = match auth::require_user(&state, &req) {
        Ok(found) => found,
        Err(resp) => return resp,
    };

    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "form": {
            "name": user.name,
            "email": user.email
        },
        "allowed_extensions": ALLOWED_EXTENSIONS,
        "user": UserResponse::from(user)
    }))
}

async fn update_account(
    state: web::Data<AppState>,
    req: HttpRequest,
    mut payload: Multipart,
) -> impl Responder {
    let (session, user) = match auth::require_user(&state, &req) {
        Ok(found) => found,
        Err(resp) => return resp,
    };

    let upload = match read_upload(&mut payload).await {
        Ok(upload) => upload,
        Err(resp) => return resp,
    };

    let form = UpdateAccountForm {
        name: upload.name,
        email: upload.email,
    };
    let mut errors = match form.check(&state.db, user.id) {
        Ok(Ok(())) => FieldErrors::new(),
        Ok(Err(errors)) => errors,
        Err(e) => return database_error("Failed to validate account form", &e),
    };
    if let Some((filename, _)) = &upload.picture {
        if allowed_extension(filename).is_none() {
            errors.insert(
                "profile_picture".to_string(),
                vec![AvatarError::ExtensionNotAllowed.to_string()],
            );
        }
    }
    if !errors.is_empty() {
        return validation_failed(errors);
    }

    let new_picture = match upload.picture {
        Some((filename, data)) => {
            let avatars = state.avatars.clone();
            match web::block(move || avatars.save_picture(&data, &filename)).await {
                Ok(Ok(stored)) => Some(stored),
                Ok(Err(AvatarError::Io(e))) => {
                    log::error!("[ACCOUNT] Failed to store picture for user {}: {}", user.id, e);
                    return HttpResponse::InternalServerError().json(serde_json::json!({
                        "success": false,
                        "error": "Failed to store profile picture"
                    }));
                }
                Ok(Err(e)) => {
                    let mut errors = FieldErrors::new();
                    errors.insert("profile_picture".to_string(), vec![e.to_string()]);
                    return validation_failed(errors);
                }
                Err(e) => {
                    log::error!("[ACCOUNT] Picture processing task failed: {}", e);
                    return HttpResponse::InternalServerError().json(serde_json::json!({
                        "success": false,
                        "error": "Internal server error"
                    }));
                }
            }
        }
        None => None,
    };

    let update = UserUpdate {
        name: Some(form.name),
        email: Some(form.email),
        profile_image: new_picture,
        ..Default::default()
    };

    match commit_account_update(&state, &user, &update) {
        Ok(Some(updated)) => {
            if !updated.email.eq_ignore_ascii_case(&user.email) {
                // Sign out other devices; this request's session stays
                match state.db.delete_user_sessions(user.id, Some(&session.token)) {
                    Ok(0) => {}
                    Ok(n) => log::info!("[ACCOUNT] Ended {} other sessions for user {}", n, user.id),
                    Err(e) => log::warn!("[ACCOUNT] Failed to end other sessions: {}", e),
                }
            }
            log::info!("[ACCOUNT] User {} updated their account", updated.id);
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "message": "Your information has been updated",
                "redirect": "/auth/account",
                "user": UserResponse::from(updated)
            }))
        }
        Ok(None) => not_found("User"),
        Err(DbError::DuplicateEmail(_)) => {
            let mut errors = FieldErrors::new();
            errors.insert("email".to_string(), vec![EMAIL_EXISTS.to_string()]);
            validation_failed(errors)
        }
        Err(e) => database_error("Failed to update account", &e),
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/auth/account")
            .route(web::get().to(account_page))
            .route(web::post().to(update_account)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::testing::{bearer_for, create_test_user, test_state};
    use crate::models::UserRole;
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::Value;
    use std::io::Cursor;

    const BOUNDARY: &str = "----account-form-boundary";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, Vec<u8>),
    }

    fn multipart(parts: Vec<Part>) -> (String, Vec<u8>) {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File(name, filename, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n",
                            name, filename
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(&data);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        (format!("multipart/form-data; boundary={}", BOUNDARY), body)
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([30, 60, 90])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn update_request(bearer: &str, parts: Vec<Part>) -> test::TestRequest {
        let (content_type, body) = multipart(parts);
        test::TestRequest::post()
            .uri("/auth/account")
            .insert_header(("Authorization", bearer.to_string()))
            .insert_header((header::CONTENT_TYPE, content_type))
            .set_payload(body)
    }

    #[actix_web::test]
    async fn test_account_page_requires_login() {
        let (state, _dir) = test_state();
        let user = create_test_user(&state, "Test User", "test@example.com", UserRole::User);
        let bearer = bearer_for(&state, &user);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::get().uri("/auth/account").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/auth/account")
            .insert_header(("Authorization", bearer))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["form"]["email"], "test@example.com");
        assert_eq!(
            body["user"]["profile_image_url"],
            "/static/img/profile_pics/default.png"
        );
    }

    #[actix_web::test]
    async fn test_update_name_and_email() {
        let (state, _dir) = test_state();
        let user = create_test_user(&state, "Test User", "test@example.com", UserRole::User);
        let bearer = bearer_for(&state, &user);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = update_request(
            &bearer,
            vec![
                Part::Text("name", "Updated Name"),
                Part::Text("email", "updated@example.com"),
                Part::File("profile_picture", "", Vec::new()),
            ],
        ).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Your information has been updated");

        let stored = state.db.get_user(user.id).unwrap().unwrap();
        assert_eq!(stored.name, "Updated Name");
        assert_eq!(stored.email, "updated@example.com");
        assert_eq!(stored.profile_image, "default.png");
    }

    #[actix_web::test]
    async fn test_upload_replaces_previous_picture() {
        let (state, _dir) = test_state();
        let user = create_test_user(&state, "Test User", "test@example.com", UserRole::User);
        let bearer = bearer_for(&state, &user);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;
        let pics = state.avatars.dir().to_path_buf();

        let req = update_request(
            &bearer,
            vec![
                Part::Text("name", "Test User"),
                Part::Text("email", "test@example.com"),
                Part::File("profile_picture", "me.png", png(400, 300)),
            ],
        ).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let first = state.db.get_user(user.id).unwrap().unwrap().profile_image;
        assert_ne!(first, "default.png");
        let saved = image::open(pics.join(&first)).unwrap();
        assert_eq!(saved.width(), 125);

        let req = update_request(
            &bearer,
            vec![
                Part::Text("name", "Test User"),
                Part::Text("email", "test@example.com"),
                Part::File("profile_picture", "again.png", png(50, 50)),
            ],
        ).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let second = state.db.get_user(user.id).unwrap().unwrap().profile_image;
        assert_ne!(second, first);
        assert!(!pics.join(&first).exists());
        assert!(pics.join(&second).exists());
        assert!(pics.join("default.png").exists());
    }

    #[actix_web::test]
    async fn test_failed_update_discards_new_picture() {
        let (state, _dir) = test_state();
        let user = create_test_user(&state, "Test User", "test@example.com", UserRole::User);
        create_test_user(&state, "Other User", "other@example.com", UserRole::User);
        let pics = state.avatars.dir().to_path_buf();

        let old = state.avatars.save_picture(&png(20, 20), "old.png").unwrap();
        let user = state
            .db
            .update_user(
                user.id,
                &UserUpdate {
                    profile_image: Some(old.clone()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        let new = state.avatars.save_picture(&png(30, 30), "new.png").unwrap();

        let update = UserUpdate {
            email: Some("other@example.com".to_string()),
            profile_image: Some(new.clone()),
            ..Default::default()
        };
        let err = commit_account_update(&state, &user, &update).unwrap_err();
        assert!(matches!(err, DbError::DuplicateEmail(_)));

        assert!(!pics.join(&new).exists());
        assert!(pics.join(&old).exists());
        assert_eq!(state.db.get_user(user.id).unwrap().unwrap().profile_image, old);
    }

    #[actix_web::test]
    async fn test_update_of_deleted_account_discards_new_picture() {
        let (state, _dir) = test_state();
        let user = create_test_user(&state, "Test User", "test@example.com", UserRole::User);
        let pics = state.avatars.dir().to_path_buf();

        let new = state.avatars.save_picture(&png(30, 30), "new.png").unwrap();
        state.db.delete_user(user.id).unwrap();

        let update = UserUpdate {
            name: Some("Updated Name".to_string()),
            profile_image: Some(new.clone()),
            ..Default::default()
        };
        assert!(commit_account_update(&state, &user, &update).unwrap().is_none());

        assert!(!pics.join(&new).exists());
        let remaining: Vec<_> = std::fs::read_dir(&pics)
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(remaining, vec![std::ffi::OsString::from("default.png")]);
    }

    #[actix_web::test]
    async fn test_email_change_ends_other_sessions() {
        let (state, _dir) = test_state();
        let user = create_test_user(&state, "Test User", "test@example.com", UserRole::User);
        let here = bearer_for(&state, &user);
        let elsewhere = bearer_for(&state, &user);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = update_request(
            &here,
            vec![
                Part::Text("name", "Test User"),
                Part::Text("email", "moved@example.com"),
            ],
        )
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        for (bearer, expected) in [(here, StatusCode::OK), (elsewhere, StatusCode::UNAUTHORIZED)] {
            let req = test::TestRequest::get()
                .uri("/auth/account")
                .insert_header(("Authorization", bearer))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), expected);
        }
    }

    #[actix_web::test]
    async fn test_rejects_disallowed_extension() {
        let (state, _dir) = test_state();
        let user = create_test_user(&state, "Test User", "test@example.com", UserRole::User);
        let bearer = bearer_for(&state, &user);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = update_request(
            &bearer,
            vec![
                Part::Text("name", "Updated Name"),
                Part::Text("email", "test@example.com"),
                Part::File("profile_picture", "anim.gif", b"GIF89a".to_vec()),
            ],
        ).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body["errors"]["profile_picture"][0],
            "file extension is not allowed, only jpg,png"
        );

        let stored = state.db.get_user(user.id).unwrap().unwrap();
        assert_eq!(stored.name, "Test User");
    }

    #[actix_web::test]
    async fn test_rejects_undecodable_picture() {
        let (state, _dir) = test_state();
        let user = create_test_user(&state, "Test User", "test@example.com", UserRole::User);
        let bearer = bearer_for(&state, &user);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = update_request(
            &bearer,
            vec![
                Part::Text("name", "Test User"),
                Part::Text("email", "test@example.com"),
                Part::File("profile_picture", "fake.png", b"definitely not a png".to_vec()),
            ],
        ).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let stored = state.db.get_user(user.id).unwrap().unwrap();
        assert_eq!(stored.profile_image, "default.png");
    }

    #[actix_web::test]
    async fn test_rejects_email_of_another_account() {
        let (state, _dir) = test_state();
        let user = create_test_user(&state, "Test User", "test@example.com", UserRole::User);
        create_test_user(&state, "Other User", "other@example.com", UserRole::User);
        let bearer = bearer_for(&state, &user);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = update_request(
            &bearer,
            vec![
                Part::Text("name", "Test User"),
                Part::Text("email", "other@example.com"),
            ],
        ).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["errors"]["email"][0], EMAIL_EXISTS);
    }

    #[actix_web::test]
    async fn test_missing_fields_fail_validation() {
        let (state, _dir) = test_state();
        let user = create_test_user(&state, "Test User", "test@example.com", UserRole::User);
        let bearer = bearer_for(&state, &user);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = update_request(&bearer, vec![Part::Text("name", "Test User")]).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["errors"].get("email").is_some());
    }
}
