//! Import Engine (C5): orchestrates one Steam import session end to end
//! (spec §4.4). One `tokio::spawn`ed task per session; a session registry
//! enforces one running session per `user_id_steam`; cancellation is
//! cooperative via `tokio_util::sync::CancellationToken`, grounded on the
//! same pattern `goweiwen-collie`'s scrape endpoint uses for its scraping
//! task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::Stream;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::error::{ScraperError, Severity};
use crate::ingest::{self, IngestInput, Outcome, Source};
use crate::library::Library;
use crate::rate_limiter::RateLimiter;
use crate::scraper::{self, DiscoveredGame, SteamCredentials, SteamScraper};
use crate::storage::{self, sessions::SessionStatus};

use super::bus::Bus;
use super::events::ImportEvent;

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("an import session is already running for this user")]
    Conflict,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Empty means "every game the scraper discovers".
    pub selected_app_ids: Vec<u32>,
}

#[derive(Clone)]
pub struct ImportEngine {
    pool: SqlitePool,
    library: Arc<Library>,
    scraper: Arc<dyn SteamScraper>,
    rate_limiter: Arc<RateLimiter>,
    bus: Arc<Bus>,
    thumbnail_quality: u8,
    sessions: Arc<Mutex<HashMap<i64, CancellationToken>>>,
}

impl ImportEngine {
    pub fn new(
        pool: SqlitePool,
        library: Arc<Library>,
        scraper: Arc<dyn SteamScraper>,
        rate_limiter: Arc<RateLimiter>,
        thumbnail_quality: u8,
    ) -> Self {
        let bus = Arc::new(Bus::new(pool.clone()));
        ImportEngine {
            pool,
            library,
            scraper,
            rate_limiter,
            bus,
            thumbnail_quality,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start an asynchronous import session for `user_id_steam`, returning
    /// its id immediately. A second call while one is already `running` for
    /// the same user returns `Conflict` (spec §4.4 "Concurrency").
    pub async fn start(
        &self,
        user_id_steam: String,
        profile_input: String,
        creds: SteamCredentials,
        opts: StartOptions,
    ) -> Result<i64, StartError> {
        if storage::sessions::find_running_for_user(&self.pool, &user_id_steam)
            .await?
            .is_some()
        {
            return Err(StartError::Conflict);
        }

        let session_id = storage::sessions::create(&self.pool, &user_id_steam).await?;
        let cancel = CancellationToken::new();
        self.sessions
            .lock()
            .unwrap()
            .insert(session_id, cancel.clone());

        let pool = self.pool.clone();
        let library = self.library.clone();
        let scraper = self.scraper.clone();
        let rate_limiter = self.rate_limiter.clone();
        let bus = self.bus.clone();
        let thumbnail_quality = self.thumbnail_quality;
        let sessions = self.sessions.clone();

        tokio::spawn(async move {
            run_session(
                &pool,
                library.as_ref(),
                scraper.as_ref(),
                rate_limiter.as_ref(),
                bus.as_ref(),
                thumbnail_quality,
                session_id,
                &profile_input,
                &creds,
                &opts,
                &cancel,
            )
            .await;
            sessions.lock().unwrap().remove(&session_id);
        });

        Ok(session_id)
    }

    /// Request cancellation of a running session and wait, bounded, for the
    /// running task to observe it (spec §4.4 "cancel... returns once the
    /// running task observes cancellation (bounded)"; spec §5 bounds the
    /// delay at "one image download plus one disk write"). Returns `false`
    /// if no running task was registered for `session_id` (already
    /// finished, or never started).
    pub async fn cancel(&self, session_id: i64) -> bool {
        let Some(token) = self.sessions.lock().unwrap().get(&session_id).cloned() else {
            return false;
        };
        token.cancel();

        const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(50);
        const MAX_WAIT: std::time::Duration = std::time::Duration::from_secs(60);
        let deadline = tokio::time::Instant::now() + MAX_WAIT;
        while tokio::time::Instant::now() < deadline {
            if !self.sessions.lock().unwrap().contains_key(&session_id) {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        true
    }

    pub async fn subscribe(
        &self,
        session_id: i64,
    ) -> Result<impl Stream<Item = ImportEvent>, sqlx::Error> {
        self.bus.subscribe(session_id).await
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_session(
    pool: &SqlitePool,
    library: &Library,
    scraper: &dyn SteamScraper,
    rate_limiter: &RateLimiter,
    bus: &Bus,
    thumbnail_quality: u8,
    session_id: i64,
    profile_input: &str,
    creds: &SteamCredentials,
    opts: &StartOptions,
    cancel: &CancellationToken,
) {
    publish(bus, session_id, ImportEvent::Status {
        message: "Starting".to_string(),
    })
    .await;

    let profile = match scraper.validate_profile(profile_input, creds).await {
        Ok(p) if p.valid => p,
        Ok(p) => {
            let error = p.error.unwrap_or_else(|| "profile validation failed".to_string());
            fail_session(pool, bus, session_id, &error).await;
            return;
        }
        Err(e) => {
            fail_session(pool, bus, session_id, &e.to_string()).await;
            return;
        }
    };

    publish(bus, session_id, ImportEvent::ProfileValidated {
        profile_name: profile.profile_name.clone().unwrap_or_default(),
        avatar_url: profile.avatar_url.clone(),
    })
    .await;

    let steam_id = profile
        .resolved_steam_id
        .clone()
        .unwrap_or_else(|| profile_input.to_string());

    let discovered = match scraper.discover_games(&steam_id, creds).await {
        Ok(g) => g,
        Err(e) => {
            fail_session(pool, bus, session_id, &e.to_string()).await;
            return;
        }
    };

    let games = select_games(discovered, &opts.selected_app_ids);
    let total_games = games.len() as u32;
    let total_screenshots: u32 = games.iter().map(|g| g.screenshot_count).sum();

    if let Err(e) = storage::sessions::set_totals(
        pool,
        session_id,
        total_games as i64,
        total_screenshots as i64,
    )
    .await
    {
        fail_session(pool, bus, session_id, &e.to_string()).await;
        return;
    }
    publish(bus, session_id, ImportEvent::GamesDiscovered {
        total_games,
        total_screenshots,
    })
    .await;

    let mut overall_completed = 0u32;
    let mut overall_skipped = 0u32;
    let mut overall_failed = 0u32;
    let mut cancelled = false;

    for game in &games {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let game_row = match storage::games::ensure_game_for_steam_app(
            pool,
            game.app_id as i64,
            &game.name,
        )
        .await
        {
            Ok(row) => row,
            Err(e) => {
                publish(bus, session_id, ImportEvent::GameError {
                    app_id: game.app_id,
                    error: e.to_string(),
                })
                .await;
                continue;
            }
        };

        publish(bus, session_id, ImportEvent::GameStart {
            app_id: game.app_id,
            name: game.name.clone(),
        })
        .await;

        let (completed, skipped, failed, game_cancelled, fatal) = run_game(
            pool,
            library,
            scraper,
            rate_limiter,
            bus,
            thumbnail_quality,
            session_id,
            &steam_id,
            creds,
            cancel,
            game,
            &game_row.folder_name,
            game_row.id,
            &mut overall_completed,
            &mut overall_skipped,
            &mut overall_failed,
        )
        .await;

        if let Some(error) = fatal {
            fail_session(pool, bus, session_id, &error).await;
            return;
        }

        publish(bus, session_id, ImportEvent::GameComplete {
            app_id: game.app_id,
            completed,
            skipped,
            failed,
            overall_completed,
            overall_skipped,
            overall_failed,
        })
        .await;

        if game_cancelled {
            cancelled = true;
            break;
        }
    }

    if cancelled {
        publish(bus, session_id, ImportEvent::ImportCancelled).await;
        publish(bus, session_id, ImportEvent::Done).await;
        let _ = storage::sessions::finish(pool, session_id, SessionStatus::Cancelled, None).await;
    } else {
        publish(bus, session_id, ImportEvent::ImportComplete {
            completed: overall_completed,
            skipped: overall_skipped,
            failed: overall_failed,
            total_games,
        })
        .await;
        publish(bus, session_id, ImportEvent::Done).await;
        let _ = storage::sessions::finish(pool, session_id, SessionStatus::Completed, None).await;
    }
}

fn select_games(discovered: Vec<DiscoveredGame>, selected_app_ids: &[u32]) -> Vec<DiscoveredGame> {
    if selected_app_ids.is_empty() {
        discovered
    } else {
        discovered
            .into_iter()
            .filter(|g| selected_app_ids.contains(&g.app_id))
            .collect()
    }
}

/// Run one game's screenshot loop, returning `(completed, skipped, failed,
/// cancelled, fatal_error)`. `fatal_error` is set whenever enumeration,
/// detail fetch, image download, or ingest surfaces a
/// [`Severity::SessionFatal`] error (e.g. `AuthRequired`, or a storage/disk
/// write failure), which fails the whole session rather than being counted
/// as one failed screenshot (spec §4.4 "Retry policy", §7).
#[allow(clippy::too_many_arguments)]
async fn run_game(
    pool: &SqlitePool,
    library: &Library,
    scraper: &dyn SteamScraper,
    rate_limiter: &RateLimiter,
    bus: &Bus,
    thumbnail_quality: u8,
    session_id: i64,
    steam_id: &str,
    creds: &SteamCredentials,
    cancel: &CancellationToken,
    game: &DiscoveredGame,
    game_folder_name: &str,
    game_id: i64,
    overall_completed: &mut u32,
    overall_skipped: &mut u32,
    overall_failed: &mut u32,
) -> (u32, u32, u32, bool, Option<String>) {
    let mut completed = 0u32;
    let mut skipped = 0u32;
    let mut failed = 0u32;

    let refs = match scraper::enumerate_all_screenshots(scraper, steam_id, game.app_id, creds, cancel)
        .await
    {
        Ok(refs) => refs,
        Err(e) if e.severity() == Severity::SessionFatal => {
            return (completed, skipped, failed, false, Some(e.to_string()));
        }
        Err(e) => {
            publish(bus, session_id, ImportEvent::GameError {
                app_id: game.app_id,
                error: e.to_string(),
            })
            .await;
            return (completed, skipped, failed, false, None);
        }
    };

    let mut cancelled = false;
    for screenshot_ref in refs {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        if rate_limiter.acquire(cancel).await.is_err() {
            cancelled = true;
            break;
        }

        let detail = match scraper::with_retry(Default::default(), cancel, || {
            report_rate_limit(rate_limiter, scraper.fetch_screenshot_detail(&screenshot_ref.detail_url, creds))
        })
        .await
        {
            Ok(d) => d,
            Err(e) if e.severity() == Severity::SessionFatal => {
                return (completed, skipped, failed, false, Some(e.to_string()));
            }
            Err(e) => {
                failed += 1;
                *overall_failed += 1;
                let _ = storage::sessions::increment_failed(pool, session_id).await;
                publish(bus, session_id, ImportEvent::ScreenshotFailed {
                    game_name: game.name.clone(),
                    error: e.to_string(),
                })
                .await;
                continue;
            }
        };

        let image = match scraper::with_retry(Default::default(), cancel, || {
            report_rate_limit(rate_limiter, scraper.download_image(&detail.full_url, creds))
        })
        .await
        {
            Ok(img) => img,
            Err(e) if e.severity() == Severity::SessionFatal => {
                return (completed, skipped, failed, false, Some(e.to_string()));
            }
            Err(e) => {
                failed += 1;
                *overall_failed += 1;
                let _ = storage::sessions::increment_failed(pool, session_id).await;
                publish(bus, session_id, ImportEvent::ScreenshotFailed {
                    game_name: game.name.clone(),
                    error: e.to_string(),
                })
                .await;
                continue;
            }
        };

        let claimed_filename = filename_from_url(&detail.full_url, &screenshot_ref.steam_screenshot_id);
        let outcome = ingest::ingest(
            pool,
            library,
            thumbnail_quality,
            IngestInput {
                bytes: image.bytes,
                source: Source::SteamImport,
                game_id,
                game_folder_name,
                claimed_filename: &claimed_filename,
                steam_screenshot_id: Some(&screenshot_ref.steam_screenshot_id),
                steam_description: detail.description.as_deref(),
                taken_at: screenshot_ref.taken_at,
            },
        )
        .await;

        match outcome {
            Ok(Outcome::Completed { .. }) => {
                completed += 1;
                *overall_completed += 1;
                let _ = storage::sessions::increment_completed(pool, session_id).await;
                publish(bus, session_id, ImportEvent::ScreenshotComplete {
                    game_name: game.name.clone(),
                    overall_progress: *overall_completed,
                })
                .await;
            }
            Ok(Outcome::Skipped { reason }) => {
                skipped += 1;
                *overall_skipped += 1;
                let _ = storage::sessions::increment_skipped(pool, session_id).await;
                publish(bus, session_id, ImportEvent::ScreenshotSkipped {
                    game_name: game.name.clone(),
                    reason: reason.as_str().to_string(),
                })
                .await;
            }
            Err(e) if e.severity() == Severity::SessionFatal => {
                return (completed, skipped, failed, false, Some(e.to_string()));
            }
            Err(e) => {
                failed += 1;
                *overall_failed += 1;
                let _ = storage::sessions::increment_failed(pool, session_id).await;
                publish(bus, session_id, ImportEvent::ScreenshotFailed {
                    game_name: game.name.clone(),
                    error: e.to_string(),
                })
                .await;
            }
        }
    }

    (completed, skipped, failed, cancelled, None)
}

async fn report_rate_limit<Fut, T>(
    rate_limiter: &RateLimiter,
    fut: Fut,
) -> Result<T, ScraperError>
where
    Fut: std::future::Future<Output = Result<T, ScraperError>>,
{
    let result = fut.await;
    match &result {
        Ok(_) => rate_limiter.report_success(),
        Err(ScraperError::RateLimited) => rate_limiter.report_rate_limited(),
        _ => {}
    }
    result
}

fn filename_from_url(url: &str, steam_screenshot_id: &str) -> String {
    url.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("{}.jpg", steam_screenshot_id))
}

async fn publish(bus: &Bus, session_id: i64, event: ImportEvent) {
    if let Err(e) = bus.publish(session_id, event).await {
        eprintln!("[import] failed to publish event for session {}: {}", session_id, e);
    }
}

async fn fail_session(pool: &SqlitePool, bus: &Bus, session_id: i64, error: &str) {
    publish(bus, session_id, ImportEvent::ImportError {
        error: error.to_string(),
    })
    .await;
    publish(bus, session_id, ImportEvent::Done).await;
    let _ = storage::sessions::finish(pool, session_id, SessionStatus::Failed, Some(error)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    use crate::scraper::stub::{screenshot_ref, StubScraper};
    use crate::scraper::{DownloadedImage, ProfileValidation, ScreenshotDetail};

    fn test_library() -> Arc<Library> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(Library::new(dir.into_path()))
    }

    #[tokio::test]
    async fn happy_path_emits_expected_event_sequence() {
        let pool = storage::connect(std::path::Path::new(":memory:"))
            .await
            .unwrap();

        let png_bytes = one_pixel_png();
        let scraper = StubScraper::new()
            .with_profile(ProfileValidation {
                valid: true,
                profile_name: Some("tester".to_string()),
                avatar_url: None,
                is_numeric_id: true,
                resolved_steam_id: Some("76561198000000001".to_string()),
                error: None,
            })
            .with_games(vec![DiscoveredGame {
                app_id: 220,
                name: "Half-Life 2".to_string(),
                screenshot_count: 1,
            }])
            .with_pages(1, 220, vec![vec![screenshot_ref("s1")], vec![]])
            .with_detail(
                "https://steamcommunity.com/sharedfiles/filedetails/?id=s1",
                ScreenshotDetail {
                    full_url: "https://example.test/s1.png".to_string(),
                    description: None,
                },
            )
            .with_image(
                "https://example.test/s1.png",
                DownloadedImage {
                    bytes: png_bytes,
                    content_type: Some("image/png".to_string()),
                },
            );

        let engine = ImportEngine::new(
            pool.clone(),
            test_library(),
            Arc::new(scraper),
            Arc::new(RateLimiter::new(1)),
            85,
        );

        let session_id = engine
            .start(
                "76561198000000001".to_string(),
                "76561198000000001".to_string(),
                SteamCredentials::anonymous(),
                StartOptions::default(),
            )
            .await
            .unwrap();

        let events: Vec<ImportEvent> = engine
            .subscribe(session_id)
            .await
            .unwrap()
            .collect::<Vec<_>>()
            .await;

        assert!(matches!(events.last(), Some(ImportEvent::Done)));
        assert!(events
            .iter()
            .any(|e| matches!(e, ImportEvent::ImportComplete { completed: 1, .. })));
    }

    #[tokio::test]
    async fn auth_required_during_detail_fetch_fails_whole_session() {
        let pool = storage::connect(std::path::Path::new(":memory:"))
            .await
            .unwrap();

        let detail_url = "https://steamcommunity.com/sharedfiles/filedetails/?id=s1";
        let scraper = StubScraper::new()
            .with_profile(ProfileValidation {
                valid: true,
                profile_name: Some("tester".to_string()),
                avatar_url: None,
                is_numeric_id: true,
                resolved_steam_id: Some("76561198000000003".to_string()),
                error: None,
            })
            .with_games(vec![DiscoveredGame {
                app_id: 220,
                name: "Half-Life 2".to_string(),
                screenshot_count: 1,
            }])
            .with_pages(1, 220, vec![vec![screenshot_ref("s1")], vec![]])
            .with_detail_error_once(detail_url, crate::error::ScraperError::AuthRequired);

        let engine = ImportEngine::new(
            pool.clone(),
            test_library(),
            Arc::new(scraper),
            Arc::new(RateLimiter::new(1)),
            85,
        );

        let session_id = engine
            .start(
                "76561198000000003".to_string(),
                "76561198000000003".to_string(),
                SteamCredentials::anonymous(),
                StartOptions::default(),
            )
            .await
            .unwrap();

        let events: Vec<ImportEvent> = engine
            .subscribe(session_id)
            .await
            .unwrap()
            .collect::<Vec<_>>()
            .await;

        assert!(matches!(events.last(), Some(ImportEvent::Done)));
        assert!(events.iter().any(|e| matches!(e, ImportEvent::ImportError { .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, ImportEvent::ScreenshotFailed { .. })));

        let status: String = sqlx::query_scalar(
            "SELECT status FROM import_sessions WHERE id = ?1",
        )
        .bind(session_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(status, "failed");
    }

    #[tokio::test]
    async fn second_start_for_same_user_conflicts() {
        let pool = storage::connect(std::path::Path::new(":memory:"))
            .await
            .unwrap();
        let scraper = StubScraper::new();
        let engine = ImportEngine::new(
            pool,
            test_library(),
            Arc::new(scraper),
            Arc::new(RateLimiter::new(1)),
            85,
        );

        storage::sessions::create(&engine.pool, "u1").await.unwrap();

        let result = engine
            .start(
                "u1".to_string(),
                "u1".to_string(),
                SteamCredentials::anonymous(),
                StartOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(StartError::Conflict)));
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
