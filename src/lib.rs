//! GameVault import core: the Steam screenshot import pipeline, the shared
//! image-ingest worker, and the live progress event bus, plus the thin
//! axum surface that exposes them. Split out as a library (with `main.rs`
//! as a thin binary wrapper) so integration tests can build their own
//! `AppState` against an in-memory database and a stub scraper.

pub mod config;
pub mod error;
pub mod import;
pub mod ingest;
pub mod library;
pub mod models;
pub mod rate_limiter;
pub mod routes;
pub mod scraper;
pub mod services;
pub mod storage;
pub mod upload;

use std::sync::Arc;

use config::Config;
use import::engine::ImportEngine;
use library::Library;
use rate_limiter::RateLimiter;
use scraper::SteamScraper;
use upload::UploadManager;

/// Everything a handler needs, built once at startup (spec §9 "Global
/// mutable state ... becomes a single `Server` value passed by reference").
pub struct AppState {
    pub config: Config,
    pub db: sqlx::SqlitePool,
    pub steam_scraper: Arc<dyn SteamScraper>,
    pub import_engine: ImportEngine,
    pub upload_manager: UploadManager,
}

impl AppState {
    /// Assemble an `AppState` from its already-constructed parts. Tests
    /// build these parts directly (an in-memory pool, a `StubScraper`)
    /// instead of going through [`Config::from_env`].
    pub fn new(
        config: Config,
        db: sqlx::SqlitePool,
        steam_scraper: Arc<dyn SteamScraper>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        let library = Arc::new(Library::new(config.library_dir.clone()));
        let import_engine = ImportEngine::new(
            db.clone(),
            library.clone(),
            steam_scraper.clone(),
            rate_limiter,
            config.thumbnail_quality,
        );
        let upload_manager = UploadManager::new(db.clone(), library, config.thumbnail_quality);

        AppState {
            config,
            db,
            steam_scraper,
            import_engine,
            upload_manager,
        }
    }
}
