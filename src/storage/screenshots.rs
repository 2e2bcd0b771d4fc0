//! Screenshot rows: dedup lookups and the insert used by the ingest worker.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqlitePool};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScreenshotRow {
    pub id: i64,
    pub source: String,
}

/// Fields needed to insert a screenshot row once the ingest worker has
/// written the original and both thumbnails to disk.
pub struct NewScreenshot<'a> {
    pub game_id: i64,
    pub filename: &'a str,
    pub file_path: &'a str,
    pub thumb_sm_path: &'a str,
    pub thumb_md_path: &'a str,
    pub file_size: i64,
    pub width: u32,
    pub height: u32,
    pub format: &'a str,
    pub taken_at: Option<DateTime<Utc>>,
    pub steam_screenshot_id: Option<&'a str>,
    pub steam_description: Option<&'a str>,
    pub source: &'a str,
    pub file_hash: &'a str,
    pub exif_data: Option<&'a [u8]>,
}

/// Look up an existing row by `(game_id, steam_screenshot_id)` — invariant 1.
pub async fn find_by_steam_id<'e, E>(
    executor: E,
    game_id: i64,
    steam_screenshot_id: &str,
) -> Result<Option<ScreenshotRow>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as(
        "SELECT id, source FROM screenshots WHERE game_id = ?1 AND steam_screenshot_id = ?2",
    )
    .bind(game_id)
    .bind(steam_screenshot_id)
    .fetch_optional(executor)
    .await
}

/// Look up an existing row by `(game_id, file_hash)` — invariant 2.
pub async fn find_by_hash<'e, E>(
    executor: E,
    game_id: i64,
    file_hash: &str,
) -> Result<Option<ScreenshotRow>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as("SELECT id, source FROM screenshots WHERE game_id = ?1 AND file_hash = ?2")
        .bind(game_id)
        .bind(file_hash)
        .fetch_optional(executor)
        .await
}

/// Insert a new screenshot row. Returns `Ok(None)` (never calling this with a
/// pre-existing key should happen; a concurrent race is surfaced as a UNIQUE
/// constraint violation from sqlx, which the caller treats as "raced dedup").
pub async fn insert(pool: &SqlitePool, row: NewScreenshot<'_>) -> Result<i64, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_scalar(
        r#"
        INSERT INTO screenshots (
            game_id, filename, file_path, thumb_sm_path, thumb_md_path,
            file_size, width, height, format, taken_at, uploaded_at,
            steam_screenshot_id, steam_description, source, file_hash,
            exif_data, is_favorite, view_count, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
            ?12, ?13, ?14, ?15, ?16, 0, 0, ?11, ?11
        )
        RETURNING id
        "#,
    )
    .bind(row.game_id)
    .bind(row.filename)
    .bind(row.file_path)
    .bind(row.thumb_sm_path)
    .bind(row.thumb_md_path)
    .bind(row.file_size)
    .bind(row.width)
    .bind(row.height)
    .bind(row.format)
    .bind(row.taken_at)
    .bind(now)
    .bind(row.steam_screenshot_id)
    .bind(row.steam_description)
    .bind(row.source)
    .bind(row.file_hash)
    .bind(row.exif_data)
    .fetch_one(pool)
    .await
}

/// True if `sqlx::Error` is a UNIQUE constraint violation (used to detect a
/// raced dedup insert between the check in step 3 and the insert in step 8).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// List every filename present in a game's directory, for the
/// file/row-parity orphan check (invariant 3).
pub async fn filenames_for_game(
    pool: &SqlitePool,
    game_id: i64,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT filename FROM screenshots WHERE game_id = ?1")
        .bind(game_id)
        .fetch_all(pool)
        .await
}
