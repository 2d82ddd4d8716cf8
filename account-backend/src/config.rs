use std::env;
use std::path::PathBuf;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const PORT: &str = "PORT";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    /// Maximum number of pooled SQLite connections.
    pub const DB_POOL_SIZE: &str = "DB_POOL_SIZE";
    /// Directory where uploaded profile pictures are written and served from.
    pub const PROFILE_PICS_DIR: &str = "PROFILE_PICS_DIR";
    /// Sliding lifetime of a login session, in hours.
    pub const SESSION_TTL_HOURS: &str = "SESSION_TTL_HOURS";
    /// PBKDF2 rounds used when hashing new passwords.
    pub const PASSWORD_HASH_ITERATIONS: &str = "PASSWORD_HASH_ITERATIONS";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 8080;
    pub const DATABASE_URL: &str = "./.db/accounts.db";
    pub const DB_POOL_SIZE: u32 = 8;
    pub const PROFILE_PICS_DIR: &str = "static/img/profile_pics";
    pub const SESSION_TTL_HOURS: i64 = 24;
    pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;
    pub const PASSWORD_HASH_ITERATIONS: u32 = 600_000;
    /// Shared placeholder image every new account starts with.
    pub const PROFILE_IMAGE: &str = "default.png";
    /// Uploaded pictures are shrunk to fit inside a square of this size.
    pub const THUMBNAIL_SIZE: u32 = 125;
}

/// URL prefix profile pictures are served under.
pub const PROFILE_PICS_URL_PREFIX: &str = "/static/img/profile_pics";

/// Returns the absolute path to the account-backend directory.
/// Uses CARGO_MANIFEST_DIR at compile time, so it always resolves
/// to account-backend/ regardless of the working directory at runtime.
pub fn backend_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Get the profile pictures directory (PROFILE_PICS_DIR or the bundled default)
pub fn profile_pics_dir() -> PathBuf {
    match env::var(env_vars::PROFILE_PICS_DIR) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => backend_dir().join(defaults::PROFILE_PICS_DIR),
    }
}

/// Public URL for a stored profile picture.
pub fn profile_image_url(filename: &str) -> String {
    format!("{}/{}", PROFILE_PICS_URL_PREFIX, filename)
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Ignoring invalid {}={:?}, using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub db_pool_size: u32,
    pub profile_pics_dir: PathBuf,
    pub session_ttl_hours: i64,
    pub password_hash_iterations: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var(env_vars::PORT)
                .unwrap_or_else(|_| defaults::PORT.to_string())
                .parse()
                .expect("PORT must be a valid number"),
            database_url: env::var(env_vars::DATABASE_URL)
                .unwrap_or_else(|_| defaults::DATABASE_URL.to_string()),
            db_pool_size: env_or(env_vars::DB_POOL_SIZE, defaults::DB_POOL_SIZE).max(1),
            profile_pics_dir: profile_pics_dir(),
            session_ttl_hours: env_or(env_vars::SESSION_TTL_HOURS, defaults::SESSION_TTL_HOURS)
                .clamp(1, defaults::MAX_SESSION_TTL_HOURS),
            password_hash_iterations: env_or(
                env_vars::PASSWORD_HASH_ITERATIONS,
                defaults::PASSWORD_HASH_ITERATIONS,
            )
            .max(1),
        }
    }

    /// Session lifetime as a chrono duration, between one hour and one year
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(
            self.session_ttl_hours
                .clamp(1, defaults::MAX_SESSION_TTL_HOURS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_image_url() {
        assert_eq!(
            profile_image_url("default.png"),
            "/static/img/profile_pics/default.png"
        );
    }

    fn config_with_ttl(session_ttl_hours: i64) -> Config {
        Config {
            port: 0,
            database_url: ":memory:".to_string(),
            db_pool_size: 1,
            profile_pics_dir: PathBuf::from("pics"),
            session_ttl_hours,
            password_hash_iterations: 1,
        }
    }

    #[test]
    fn test_session_ttl_is_bounded() {
        assert_eq!(config_with_ttl(24).session_ttl(), chrono::Duration::hours(24));
        assert_eq!(
            config_with_ttl(i64::MAX).session_ttl(),
            chrono::Duration::hours(defaults::MAX_SESSION_TTL_HOURS)
        );
        assert_eq!(config_with_ttl(-3).session_ttl(), chrono::Duration::hours(1));

        let ttl = config_with_ttl(i64::MAX).session_ttl();
        assert!(chrono::Utc::now().checked_add_signed(ttl).is_some());
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        // Name chosen to never collide with a real variable
        let name = "ACCOUNT_BACKEND_TEST_ENV_OR_UNSET";
        assert_eq!(env_or(name, 42u32), 42);
    }
}
