use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use gamevault_import::config::Config;
use gamevault_import::rate_limiter::RateLimiter;
use gamevault_import::scraper::{SteamHttpScraper, SteamScraper};
use gamevault_import::{routes, storage, AppState};

async fn health() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    println!("[startup] data dir: {}", config.data_dir.display());
    println!("[startup] library dir: {}", config.library_dir.display());
    println!("[startup] db path: {}", config.db_path.display());
    if config.disable_auth {
        println!("[startup] GAMEVAULT_DISABLE_AUTH is set — the import/upload surface is unauthenticated");
    }

    let pool = storage::connect(&config.db_path)
        .await
        .unwrap_or_else(|e| panic!("failed to open database at {:?}: {}", config.db_path, e));

    let steam_scraper: Arc<dyn SteamScraper> = Arc::new(SteamHttpScraper::new());
    let rate_limiter = Arc::new(RateLimiter::new(config.import_rate_limit_ms));

    let max_upload_bytes = config.max_upload_size_bytes();
    let base_url = config.base_url.clone();

    let state = Arc::new(AppState::new(config, pool, steam_scraper, rate_limiter));

    let cors = CorsLayer::new()
        .allow_origin(
            base_url
                .parse::<HeaderValue>()
                .unwrap_or_else(|_| HeaderValue::from_static("http://localhost:5173")),
        )
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ]);

    let x_frame_options = SetResponseHeaderLayer::overriding(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    let x_content_type_options = SetResponseHeaderLayer::overriding(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );

    let app = Router::new()
        .route("/health", get(health))
        .merge(routes::build_routes())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(x_frame_options)
        .layer(x_content_type_options)
        .with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind to {}: {}", addr, e));

    println!("[startup] listening on http://{}", addr);
    axum::serve(listener, app)
        .await
        .expect("server failed");

    Ok(())
}
