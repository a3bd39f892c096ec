mod auth;
mod config;
mod inference;
mod predict;
mod routes;
mod storage;
#[cfg(test)]
mod testing;
mod views;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use auth::jwt::JwtService;
use auth::session::SessionService;
use auth::user_store::{InMemoryUserStore, UserStore};
use config::AppConfig;
use inference::classifier::load_classifier;
use inference::config::ModelConfig;
use routes::{AppState, configure_app};
use std::env;
use std::io;
use std::sync::Arc;
use storage::upload_store::UploadStore;

fn startup_error(context: &str, e: impl std::fmt::Display) -> io::Error {
    log::error!("{}: {}", context, e);
    io::Error::other(format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = AppConfig::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let model_config = ModelConfig::load(&config.model_config_path)
        .map_err(|e| startup_error("Failed to read model manifest", e))?;
    let classifier =
        load_classifier(&model_config).map_err(|e| startup_error("Failed to load model at startup", e))?;
    log::info!(
        "Model ready: labels {:?}, input {}x{}",
        classifier.labels(),
        classifier.input_size(),
        classifier.input_size()
    );

    let uploads = UploadStore::new(config.upload_dir.clone(), config.max_upload_bytes);
    uploads
        .ensure_root()
        .map_err(|e| startup_error("Failed to create upload directory", e))?;
    log::info!(
        "Storing uploads in {} (limit {} bytes)",
        uploads.root().display(),
        uploads.max_bytes()
    );

    let users: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
    let sessions = SessionService::new(
        JwtService::new(&config.session_secret),
        chrono::Duration::hours(config.session_ttl_hours),
    );

    let state = AppState {
        users: web::Data::from(users),
        sessions: web::Data::new(sessions),
        classifier: web::Data::from(classifier),
        uploads: web::Data::new(uploads),
    };

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .configure(|cfg| configure_app(cfg, &state))
    })
    .bind(&bind_address)?
    .run()
    .await
}
