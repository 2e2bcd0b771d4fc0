//! Manual upload HTTP surface (spec §6.1): identical ingest path as import,
//! fed from a multipart request instead of the Steam scraper.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use tokio_stream::StreamExt;

use crate::models::UploadStartedResponse;
use crate::services::auth::AuthUser;
use crate::services::error::LogErr;
use crate::upload::{UploadEvent, UploadedFile};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/upload", post(upload))
        .route("/api/upload/progress/{task_id}", get(progress))
}

async fn upload(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<UploadStartedResponse>, StatusCode> {
    let mut game_id: Option<i64> = None;
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .log_status("multipart read error", StatusCode::BAD_REQUEST)?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "game_id" {
            let text = field
                .text()
                .await
                .log_status("invalid game_id field", StatusCode::BAD_REQUEST)?;
            game_id = text.trim().parse().ok();
        } else if name == "files[]" || name == "files" {
            let filename = field
                .file_name()
                .unwrap_or("screenshot")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .log_status("multipart body read error", StatusCode::BAD_REQUEST)?;
            files.push(UploadedFile {
                filename,
                bytes: bytes.to_vec(),
            });
        }
    }

    let game_id = game_id.ok_or(StatusCode::BAD_REQUEST)?;
    if files.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let task_id = state.upload_manager.start(game_id, files);
    Ok(Json(UploadStartedResponse { task_id }))
}

async fn progress(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(task_id): Path<i64>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let stream = state.upload_manager.subscribe(task_id).ok_or(StatusCode::NOT_FOUND)?;

    let sse_stream = stream.map(|event: UploadEvent| {
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
