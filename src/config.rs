//! Environment-driven configuration, read once at startup into a single
//! `Config` value carried on `AppState`.

use std::path::PathBuf;

/// All runtime knobs for the import core, sourced from `GAMEVAULT_*` env vars.
#[derive(Debug, Clone)]
pub struct Config {
    pub secret_key: String,
    pub base_url: String,
    pub data_dir: PathBuf,
    pub library_dir: PathBuf,
    pub db_path: PathBuf,
    pub disable_auth: bool,
    pub import_rate_limit_ms: u64,
    pub max_upload_size_mb: u64,
    pub thumbnail_quality: u8,
    pub token_expiry_days: i64,
    /// Parsed but unused by this crate — consumed by the metadata-cascade
    /// subsystem (Steam Store / SteamGridDB / IGDB lookups), which is out of
    /// scope here. Kept so the env surface matches the documented contract.
    pub steam_api_key: Option<String>,
    pub steamgriddb_api_key: Option<String>,
    pub igdb_client_id: Option<String>,
    pub igdb_client_secret: Option<String>,
}

const DEFAULT_RATE_LIMIT_MS: u64 = 1000;
const DEFAULT_MAX_UPLOAD_MB: u64 = 200;
const DEFAULT_THUMBNAIL_QUALITY: u8 = 85;
const DEFAULT_TOKEN_EXPIRY_DAYS: i64 = 30;

impl Config {
    /// Load configuration from the process environment, falling back to
    /// documented defaults for anything missing or unparsable.
    pub fn from_env() -> Self {
        let data_dir = env_path("GAMEVAULT_DATA_DIR", "./data");
        let library_dir = env_path_opt("GAMEVAULT_LIBRARY_DIR")
            .unwrap_or_else(|| data_dir.join("library"));
        let db_path = env_path_opt("GAMEVAULT_DB_PATH")
            .unwrap_or_else(|| data_dir.join("gamevault.db"));

        Config {
            secret_key: std::env::var("GAMEVAULT_SECRET_KEY").unwrap_or_else(|_| {
                eprintln!(
                    "[config] GAMEVAULT_SECRET_KEY not set, using an insecure development default"
                );
                "insecure-development-secret".to_string()
            }),
            base_url: std::env::var("GAMEVAULT_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            data_dir,
            library_dir,
            db_path,
            disable_auth: std::env::var("GAMEVAULT_DISABLE_AUTH")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            import_rate_limit_ms: env_parse("GAMEVAULT_IMPORT_RATE_LIMIT_MS", DEFAULT_RATE_LIMIT_MS),
            max_upload_size_mb: env_parse("GAMEVAULT_MAX_UPLOAD_SIZE_MB", DEFAULT_MAX_UPLOAD_MB),
            thumbnail_quality: env_parse("GAMEVAULT_THUMBNAIL_QUALITY", DEFAULT_THUMBNAIL_QUALITY),
            token_expiry_days: env_parse("GAMEVAULT_TOKEN_EXPIRY_DAYS", DEFAULT_TOKEN_EXPIRY_DAYS),
            steam_api_key: std::env::var("GAMEVAULT_STEAM_API_KEY").ok(),
            steamgriddb_api_key: std::env::var("GAMEVAULT_STEAMGRIDDB_API_KEY").ok(),
            igdb_client_id: std::env::var("GAMEVAULT_IGDB_CLIENT_ID").ok(),
            igdb_client_secret: std::env::var("GAMEVAULT_IGDB_CLIENT_SECRET").ok(),
        }
    }

    pub fn max_upload_size_bytes(&self) -> usize {
        (self.max_upload_size_mb * 1024 * 1024) as usize
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    env_path_opt(key).unwrap_or_else(|| PathBuf::from(default))
}

fn env_path_opt(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().map(PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            eprintln!("[config] {} has an invalid value {:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
