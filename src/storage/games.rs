//! Game rows: folder-name derivation and CRUD used by the import engine.
//!
//! Functions take a generic `Executor` so they can run against either the
//! pool directly or an open transaction (see `services::db`).

use chrono::Utc;
use sqlx::{Executor, Sqlite, SqlitePool};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Game {
    pub id: i64,
    pub name: String,
    pub folder_name: String,
    pub steam_app_id: Option<i64>,
}

/// Derive a filesystem-safe folder name from a game's display name:
/// lowercase, collapse non-alphanumerics to single `-`, bound the length.
pub fn derive_folder_name(name: &str) -> String {
    const MAX_LEN: usize = 64;
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep && !out.is_empty() {
            out.push('-');
            last_was_sep = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("game");
    }
    out.truncate(MAX_LEN);
    out
}

/// Find an existing game by Steam app id, or create one with a
/// collision-suffixed folder name. Returns the game row either way.
///
/// Takes the pool directly (rather than a generic `Executor`) because it
/// issues several sequential statements that must observe each other's
/// effects, which a single borrowed transaction connection can't do here.
pub async fn ensure_game_for_steam_app(
    pool: &SqlitePool,
    steam_app_id: i64,
    name: &str,
) -> Result<Game, sqlx::Error> {
    if let Some(game) = find_by_steam_app_id(pool, steam_app_id).await? {
        return Ok(game);
    }

    let folder_name = unique_folder_name(pool, &derive_folder_name(name)).await?;
    let now = Utc::now().to_rfc3339();

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO games (name, folder_name, steam_app_id, is_public, created_at, updated_at)
        VALUES (?1, ?2, ?3, 0, ?4, ?4)
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(&folder_name)
    .bind(steam_app_id)
    .bind(&now)
    .fetch_one(pool)
    .await?;

    Ok(Game {
        id,
        name: name.to_string(),
        folder_name,
        steam_app_id: Some(steam_app_id),
    })
}

pub async fn find_by_steam_app_id<'e, E>(
    executor: E,
    steam_app_id: i64,
) -> Result<Option<Game>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as(
        "SELECT id, name, folder_name, steam_app_id FROM games WHERE steam_app_id = ?1",
    )
    .bind(steam_app_id)
    .fetch_optional(executor)
    .await
}

pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Game>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as("SELECT id, name, folder_name, steam_app_id FROM games WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Append a numeric suffix (`-2`, `-3`, ...) until `folder_name` is unique.
async fn unique_folder_name(pool: &SqlitePool, base: &str) -> Result<String, sqlx::Error> {
    let mut candidate = base.to_string();
    let mut suffix = 2;
    loop {
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM games WHERE folder_name = ?1")
                .bind(&candidate)
                .fetch_optional(pool)
                .await?;
        if exists.is_none() {
            return Ok(candidate);
        }
        candidate = format!("{}-{}", base, suffix);
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_folder_name_collapses_and_lowercases() {
        assert_eq!(derive_folder_name("Half-Life 2!!"), "half-life-2");
        assert_eq!(derive_folder_name("  ___  "), "game");
        assert_eq!(
            derive_folder_name(&"a".repeat(200)).len(),
            64
        );
    }
}
