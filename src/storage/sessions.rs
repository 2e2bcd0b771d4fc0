//! Import session rows: creation, counter updates, and one-shot terminal
//! transitions (spec §3 "Lifecycle").

use chrono::Utc;
use sqlx::SqlitePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: i64,
    pub user_id_steam: String,
    pub status: String,
}

/// Insert a new `running` session row for `user_id_steam`. The import
/// engine enforces "one session per user at a time" itself (see
/// `import::engine::ImportEngine::start`); this just records the row.
pub async fn create(pool: &SqlitePool, user_id_steam: &str) -> Result<i64, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query_scalar(
        r#"
        INSERT INTO import_sessions (user_id_steam, started_at, status)
        VALUES (?1, ?2, 'running')
        RETURNING id
        "#,
    )
    .bind(user_id_steam)
    .bind(&now)
    .fetch_one(pool)
    .await
}

pub async fn find_running_for_user(
    pool: &SqlitePool,
    user_id_steam: &str,
) -> Result<Option<SessionRow>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, user_id_steam, status FROM import_sessions WHERE user_id_steam = ?1 AND status = 'running'",
    )
    .bind(user_id_steam)
    .fetch_optional(pool)
    .await
}

pub async fn set_totals(
    pool: &SqlitePool,
    session_id: i64,
    total_games: i64,
    total_screenshots: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE import_sessions SET total_games = ?2, total_screenshots = ?3 WHERE id = ?1",
    )
    .bind(session_id)
    .bind(total_games)
    .bind(total_screenshots)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn increment_completed(pool: &SqlitePool, session_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE import_sessions SET completed = completed + 1 WHERE id = ?1")
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn increment_skipped(pool: &SqlitePool, session_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE import_sessions SET skipped = skipped + 1 WHERE id = ?1")
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn increment_failed(pool: &SqlitePool, session_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE import_sessions SET failed = failed + 1 WHERE id = ?1")
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Write the terminal status once. Terminal statuses are write-once: this
/// only updates rows that are still `running`, so a duplicate call (e.g. a
/// cancel racing the natural completion path) is a no-op.
pub async fn finish(
    pool: &SqlitePool,
    session_id: i64,
    status: SessionStatus,
    last_error: Option<&str>,
) -> Result<(), sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        UPDATE import_sessions
        SET status = ?2, finished_at = ?3, last_error = ?4
        WHERE id = ?1 AND status = 'running'
        "#,
    )
    .bind(session_id)
    .bind(status.as_str())
    .bind(&now)
    .bind(last_error)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finish_is_write_once() {
        let pool = crate::storage::connect(std::path::Path::new(":memory:"))
            .await
            .unwrap();
        let id = create(&pool, "76561198000000001").await.unwrap();
        finish(&pool, id, SessionStatus::Completed, None).await.unwrap();
        finish(&pool, id, SessionStatus::Failed, Some("should not apply"))
            .await
            .unwrap();

        let status: String = sqlx::query_scalar("SELECT status FROM import_sessions WHERE id = ?1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "completed");
    }
}
