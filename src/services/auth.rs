//! Bearer-token extractor guarding the import/upload HTTP surface (spec
//! §6.1, §1 "[ADDED]"). Tokens are opaque strings minted out of band and
//! looked up in `api_keys` — this crate never issues or rotates them.
//!
//! Accepts `Authorization: Bearer <token>` or `?token=<token>` (the latter
//! so `EventSource`, which cannot set headers, can authenticate the SSE
//! progress routes). Bypassed entirely when `GAMEVAULT_DISABLE_AUTH` is set.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use std::sync::Arc;

use crate::storage;
use crate::AppState;

/// The Steam user id (spec `user_id_steam`) a validated request authenticates
/// as. `None` when auth is disabled and no token was presented.
pub struct AuthUser(pub Option<String>);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if state.config.disable_auth {
            return Ok(AuthUser(None));
        }

        let token = bearer_header(parts).or_else(|| query_token(parts));
        let Some(token) = token else {
            return Err(StatusCode::UNAUTHORIZED);
        };

        let user_id = storage::api_keys::resolve(&state.db, &token)
            .await
            .map_err(|e| {
                eprintln!("[auth] token lookup failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(AuthUser(Some(user_id)))
    }
}

fn bearer_header(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// `?token=<value>`, for `EventSource` requests which cannot set headers.
/// Opaque bearer tokens are not expected to contain characters needing
/// percent-decoding, so this is a plain key/value split rather than a full
/// query-string parse.
fn query_token(parts: &Parts) -> Option<String> {
    let query = parts.uri.query()?;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == "token").then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn query_token_extracts_from_query_string() {
        let req = Request::builder()
            .uri("/api/steam/import/1/progress?token=abc123")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert_eq!(query_token(&parts), Some("abc123".to_string()));
    }

    #[test]
    fn query_token_is_none_without_token_param() {
        let req = Request::builder()
            .uri("/api/steam/import/1/progress?foo=bar")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert_eq!(query_token(&parts), None);
    }
}
