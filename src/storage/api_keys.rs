//! Bearer-token lookups backing `services::auth`. This crate never mints
//! or rotates tokens — that is the account-authentication feature's job —
//! it only validates the ones handed to it.

use chrono::Utc;
use sqlx::SqlitePool;

/// Resolve a bearer token to the Steam user id it was issued for, if the
/// token exists and has not expired.
pub async fn resolve(pool: &SqlitePool, token: &str) -> Result<Option<String>, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query_scalar(
        "SELECT user_id_steam FROM api_keys WHERE token = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
    )
    .bind(token)
    .bind(&now)
    .fetch_optional(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_unknown_token_is_none() {
        let pool = crate::storage::connect(std::path::Path::new(":memory:"))
            .await
            .unwrap();
        assert!(resolve(&pool, "nope").await.unwrap().is_none());
    }
}
