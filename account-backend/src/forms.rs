//! Request forms and their validation rules.

use serde::Deserialize;
use std::collections::BTreeMap;
use validator::{Validate, ValidationErrors};

use crate::db::{Database, DbResult};

pub const EMAIL_EXISTS: &str = "This email already exists";

/// Field name -> human readable messages, as returned to clients
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginForm {
    #[serde(default)]
    #[validate(
        length(min = 4, max = 50, message = "Email must be between 4 and 50 characters"),
        email(message = "Invalid email address")
    )]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 8, max = 50, message = "Must provide a password of 8 to 50 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterForm {
    #[serde(default)]
    #[validate(length(min = 4, max = 50, message = "Name must be between 4 and 50 characters"))]
    pub name: String,
    #[serde(default)]
    #[validate(
        length(min = 4, max = 50, message = "Email must be between 4 and 50 characters"),
        email(message = "Invalid email address")
    )]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 8, max = 50, message = "Must provide a password of 8 to 50 characters"))]
    pub password: String,
}

impl RegisterForm {
    /// Field rules plus the uniqueness check on `email`
    pub fn check(&self, db: &Database) -> DbResult<Result<(), FieldErrors>> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => field_errors(&e),
        };

        if !errors.contains_key("email") && db.find_user_by_email(&self.email)?.is_some() {
            errors
                .entry("email".to_string())
                .or_default()
                .push(EMAIL_EXISTS.to_string());
        }

        Ok(if errors.is_empty() { Ok(()) } else { Err(errors) })
    }
}

/// Account page form. The picture arrives as a separate multipart part.
#[derive(Debug, Clone, Default, Validate)]
pub struct UpdateAccountForm {
    #[validate(length(min = 4, max = 50, message = "Name must be between 4 and 50 characters"))]
    pub name: String,
    #[validate(
        length(min = 4, max = 50, message = "Email must be between 4 and 50 characters"),
        email(message = "Invalid email address")
    )]
    pub email: String,
}

impl UpdateAccountForm {
    /// Field rules plus: a changed email must not belong to another account
    pub fn check(&self, db: &Database, user_id: i64) -> DbResult<Result<(), FieldErrors>> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => field_errors(&e),
        };

        if !errors.contains_key("email") {
            if let Some(owner) = db.find_user_by_email(&self.email)? {
                if owner.id != user_id {
                    errors
                        .entry("email".to_string())
                        .or_default()
                        .push(EMAIL_EXISTS.to_string());
                }
            }
        }

        Ok(if errors.is_empty() { Ok(()) } else { Err(errors) })
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PostForm {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Content must not be empty"))]
    pub content: String,
}

/// Flatten validator errors into `{field: [message, ...]}`
pub fn field_errors(errors: &ValidationErrors) -> FieldErrors {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| match e.message {
                    Some(ref msg) => msg.to_string(),
                    None => format!("Invalid value ({})", e.code),
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}
