//! Manual-upload ingest (spec §6.1 `POST /api/upload`): drives the same
//! ingest worker (C7) the import engine uses, one background task per
//! upload batch, with its own lightweight progress topic.
//!
//! Unlike the import engine's [`crate::import::bus::Bus`], upload progress
//! is not durably logged — there is no `UploadSession` entity in the data
//! model (spec §3) to anchor replay against, and a disconnected uploader is
//! expected to just re-upload rather than resume. A subscriber that attaches
//! after the task has already finished simply sees the channel closed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::ingest::{self, IngestInput, Outcome, Source};
use crate::library::Library;
use crate::storage::games;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum UploadEvent {
    FileComplete { filename: String },
    FileSkipped { filename: String, reason: String },
    FileFailed { filename: String, error: String },
    Done { completed: u32, skipped: u32, failed: u32 },
}

impl UploadEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            UploadEvent::FileComplete { .. } => "file_complete",
            UploadEvent::FileSkipped { .. } => "file_skipped",
            UploadEvent::FileFailed { .. } => "file_failed",
            UploadEvent::Done { .. } => "done",
        }
    }

    pub fn payload_json(&self) -> String {
        let value = match self {
            UploadEvent::FileComplete { filename } => json!({ "filename": filename }),
            UploadEvent::FileSkipped { filename, reason } => {
                json!({ "filename": filename, "reason": reason })
            }
            UploadEvent::FileFailed { filename, error } => {
                json!({ "filename": filename, "error": error })
            }
            UploadEvent::Done { completed, skipped, failed } => {
                json!({ "completed": completed, "skipped": skipped, "failed": failed })
            }
        };
        value.to_string()
    }
}

pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub struct UploadManager {
    pool: SqlitePool,
    library: Arc<Library>,
    thumbnail_quality: u8,
    next_id: AtomicI64,
    channels: Mutex<HashMap<i64, broadcast::Sender<UploadEvent>>>,
}

impl UploadManager {
    pub fn new(pool: SqlitePool, library: Arc<Library>, thumbnail_quality: u8) -> Self {
        UploadManager {
            pool,
            library,
            thumbnail_quality,
            next_id: AtomicI64::new(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Start ingesting `files` into `game_id`, returning a task id
    /// immediately. Ingest runs serially per task, matching the import
    /// engine's "screenshots within a game are serial" discipline (spec
    /// §4.4 "Concurrency") since both paths share the same per-game
    /// directory writes.
    pub fn start(&self, game_id: i64, files: Vec<UploadedFile>) -> i64 {
        let task_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        self.channels.lock().unwrap().insert(task_id, tx.clone());

        let pool = self.pool.clone();
        let library = self.library.clone();
        let thumbnail_quality = self.thumbnail_quality;

        tokio::spawn(async move {
            run_upload_task(pool, library, thumbnail_quality, game_id, files, tx).await;
        });

        task_id
    }

    pub fn subscribe(&self, task_id: i64) -> Option<impl futures::Stream<Item = UploadEvent>> {
        let rx = self.channels.lock().unwrap().get(&task_id)?.subscribe();
        Some(BroadcastStream::new(rx).filter_map(|msg| match msg {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(_)) => None,
        }))
    }
}

async fn run_upload_task(
    pool: SqlitePool,
    library: Arc<Library>,
    thumbnail_quality: u8,
    game_id: i64,
    files: Vec<UploadedFile>,
    tx: broadcast::Sender<UploadEvent>,
) {
    let game = match games::find_by_id(&pool, game_id).await {
        Ok(Some(g)) => g,
        Ok(None) => {
            let _ = tx.send(UploadEvent::Done { completed: 0, skipped: 0, failed: files.len() as u32 });
            return;
        }
        Err(e) => {
            eprintln!("[upload] failed to load game {}: {}", game_id, e);
            let _ = tx.send(UploadEvent::Done { completed: 0, skipped: 0, failed: files.len() as u32 });
            return;
        }
    };

    let (mut completed, mut skipped, mut failed) = (0u32, 0u32, 0u32);

    for file in files {
        let outcome = ingest::ingest(
            &pool,
            &library,
            thumbnail_quality,
            IngestInput {
                bytes: file.bytes,
                source: Source::Upload,
                game_id,
                game_folder_name: &game.folder_name,
                claimed_filename: &file.filename,
                steam_screenshot_id: None,
                steam_description: None,
                taken_at: None,
            },
        )
        .await;

        match outcome {
            Ok(Outcome::Completed { .. }) => {
                completed += 1;
                let _ = tx.send(UploadEvent::FileComplete { filename: file.filename });
            }
            Ok(Outcome::Skipped { reason }) => {
                skipped += 1;
                let _ = tx.send(UploadEvent::FileSkipped {
                    filename: file.filename,
                    reason: reason.as_str().to_string(),
                });
            }
            Err(e) => {
                failed += 1;
                let _ = tx.send(UploadEvent::FileFailed {
                    filename: file.filename,
                    error: e.to_string(),
                });
            }
        }
    }

    let _ = tx.send(UploadEvent::Done { completed, skipped, failed });
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn start_ingests_files_and_emits_done_last() {
        let pool = crate::storage::connect(std::path::Path::new(":memory:"))
            .await
            .unwrap();
        let game = games::ensure_game_for_steam_app(&pool, 1, "Portal 2").await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let library = Arc::new(Library::new(dir.into_path()));
        let manager = UploadManager::new(pool, library, 85);

        let task_id = manager.start(
            game.id,
            vec![UploadedFile {
                filename: "shot.png".to_string(),
                bytes: one_pixel_png(),
            }],
        );

        let events: Vec<UploadEvent> = manager
            .subscribe(task_id)
            .unwrap()
            .collect::<Vec<_>>()
            .await;

        assert!(matches!(events.last(), Some(UploadEvent::Done { completed: 1, .. })));
    }

    fn one_pixel_png() -> Vec<u8> {
        vec![
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
            0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00,
            0x00, 0x90, 0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x08,
            0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, 0x03, 0x01, 0x01, 0x00, 0x18, 0xDD, 0x8D,
            0xB0, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
        ]
    }
}
