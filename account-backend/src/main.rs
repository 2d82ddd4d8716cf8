use actix_cors::Cors;
use actix_web::{middleware::Logger, middleware::NormalizePath, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Instant;

mod auth;
mod avatar;
mod config;
mod controllers;
mod db;
mod forms;
mod models;

use avatar::AvatarStore;
use config::Config;
use db::Database;

const SESSION_PURGE_INTERVAL_SECS: u64 = 3600;

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub avatars: Arc<AvatarStore>,
    pub started_at: Instant,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    log::info!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    let port = config.port;

    log::info!("Initializing database at {}", config.database_url);
    let db = Arc::new(
        Database::new(&config.database_url, config.db_pool_size)
            .expect("Failed to initialize database"),
    );

    log::info!("Profile pictures stored in {:?}", config.profile_pics_dir);
    let avatars = Arc::new(AvatarStore::new(&config.profile_pics_dir));
    if let Err(e) = avatars.ensure_default() {
        log::error!("Failed to prepare profile picture directory: {}", e);
    }

    // Expired sessions are rejected on lookup; this only reclaims the rows
    let purge_db = Arc::clone(&db);
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(SESSION_PURGE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match purge_db.purge_expired_sessions() {
                Ok(0) => {}
                Ok(n) => log::info!("Purged {} expired sessions", n),
                Err(e) => log::warn!("Failed to purge expired sessions: {}", e),
            }
        }
    });

    let started_at = Instant::now();

    log::info!("Starting server on port {}", port);
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                db: Arc::clone(&db),
                config: config.clone(),
                avatars: Arc::clone(&avatars),
                started_at,
            }))
            .wrap(NormalizePath::trim())
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::config_extractors)
            .configure(controllers::health::config_routes)
            .configure(controllers::auth::config)
            .configure(controllers::account::config)
            .configure(controllers::users::config)
            .configure(controllers::posts::config)
            .configure(controllers::profile_pics::config)
    })
    .bind(("0.0.0.0", port))?
    .run();

    let server_handle = server.handle();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        log::info!("Received Ctrl+C, shutting down...");

        let server_stop = server_handle.stop(true);
        if tokio::time::timeout(std::time::Duration::from_secs(5), server_stop).await.is_err() {
            log::warn!("Timeout waiting for HTTP server to stop, forcing exit...");
        }

        log::info!("Shutdown complete");
    });

    server.await
}
