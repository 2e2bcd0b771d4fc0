//! The durable `import_events` log backing replay for late/reconnecting SSE
//! subscribers (spec §9 Open Question — resolved as "durable log", see
//! DESIGN.md).

use chrono::Utc;
use sqlx::SqlitePool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    pub seq: i64,
    pub kind: String,
    pub payload_json: String,
}

/// Append an event at the next sequence number for `session_id` and return
/// the assigned `seq`. Sequence numbers are computed from `MAX(seq)` under
/// the same connection, which is safe here because the pool is single
/// writer (max_connections(1), see `storage::connect`).
pub async fn append(
    pool: &SqlitePool,
    session_id: i64,
    kind: &str,
    payload_json: &str,
) -> Result<i64, sqlx::Error> {
    let next_seq: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM import_events WHERE session_id = ?1",
    )
    .bind(session_id)
    .fetch_one(pool)
    .await?;

    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO import_events (session_id, seq, kind, payload_json, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(session_id)
    .bind(next_seq)
    .bind(kind)
    .bind(payload_json)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(next_seq)
}

/// Fetch the full backlog for a session in `seq` order, for a subscriber
/// that attaches after some events have already been published.
pub async fn backlog(pool: &SqlitePool, session_id: i64) -> Result<Vec<EventRow>, sqlx::Error> {
    sqlx::query_as(
        "SELECT seq, kind, payload_json FROM import_events WHERE session_id = ?1 ORDER BY seq ASC",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_assigns_monotonic_seq() {
        let pool = crate::storage::connect(std::path::Path::new(":memory:"))
            .await
            .unwrap();
        let session_id = crate::storage::sessions::create(&pool, "u").await.unwrap();

        let s1 = append(&pool, session_id, "status", "{}").await.unwrap();
        let s2 = append(&pool, session_id, "status", "{}").await.unwrap();
        assert_eq!((s1, s2), (1, 2));

        let rows = backlog(&pool, session_id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].seq, 1);
        assert_eq!(rows[1].seq, 2);
    }
}
