//! Steam import HTTP surface (spec §6.1): profile validation, game
//! discovery, starting/cancelling an import session, and its SSE progress
//! stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use tokio_stream::StreamExt;

use crate::import::engine::StartError;
use crate::import::events::ImportEvent;
use crate::models::{
    GameSummary, ImportRequestBody, SessionStartedResponse, SteamCredentialsBody,
    SteamValidateResponse,
};
use crate::services::auth::AuthUser;
use crate::services::error::LogErr;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/steam/validate", post(validate))
        .route("/api/steam/games", post(games))
        .route("/api/steam/import", post(start_import))
        .route(
            "/api/steam/import/{session_id}/progress",
            get(progress),
        )
        .route(
            "/api/steam/import/{session_id}/cancel",
            post(cancel),
        )
}

async fn validate(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Json(body): Json<SteamCredentialsBody>,
) -> Result<Json<SteamValidateResponse>, StatusCode> {
    let result = state
        .steam_scraper
        .validate_profile(&body.user_id, &body.credentials())
        .await
        .log_500("steam profile validation error")?;
    Ok(Json(result.into()))
}

async fn games(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Json(body): Json<SteamCredentialsBody>,
) -> Result<Json<Vec<GameSummary>>, StatusCode> {
    let games = state
        .steam_scraper
        .discover_games(&body.user_id, &body.credentials())
        .await
        .log_500("steam game discovery error")?;
    Ok(Json(games.into_iter().map(GameSummary::from).collect()))
}

async fn start_import(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Json(body): Json<ImportRequestBody>,
) -> Result<Json<SessionStartedResponse>, StatusCode> {
    let user_id = body.user_id.clone();
    let opts = crate::import::engine::StartOptions {
        selected_app_ids: body.game_ids.clone(),
    };

    let session_id = state
        .import_engine
        .start(user_id, body.user_id.clone(), body.credentials(), opts)
        .await
        .map_err(|e| match e {
            StartError::Conflict => StatusCode::CONFLICT,
            StartError::Db(e) => {
                eprintln!("[steam] failed to start import session: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;

    Ok(Json(SessionStartedResponse { session_id }))
}

async fn progress(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(session_id): Path<i64>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let stream = state
        .import_engine
        .subscribe(session_id)
        .await
        .log_500("failed to subscribe to import session")?;

    let sse_stream = stream.map(|event: ImportEvent| {
        Ok(Event::default()
            .event(event.kind())
            .data(event.payload_json()))
    });

    Ok(Sse::new(sse_stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(session_id): Path<i64>,
) -> impl IntoResponse {
    state.import_engine.cancel(session_id).await;
    StatusCode::NO_CONTENT
}
