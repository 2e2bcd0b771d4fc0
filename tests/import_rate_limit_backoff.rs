//! The scraper answers one request with a 429 before succeeding on retry.
//! The screenshot should still complete — `with_retry` treats `RateLimited`
//! as transient and keeps trying — and the session finishes as if nothing
//! went wrong (spec §4.2/§4.4 retry policy, scenario 4).

mod common;

use futures::StreamExt;

use gamevault_import::error::ScraperError;
use gamevault_import::import::engine::StartOptions;
use gamevault_import::import::events::ImportEvent;
use gamevault_import::scraper::stub::{screenshot_ref, StubScraper};
use gamevault_import::scraper::{DiscoveredGame, DownloadedImage, ProfileValidation, ScreenshotDetail, SteamCredentials};

const STEAM_ID: &str = "76561198000000004";

#[tokio::test]
async fn screenshot_detail_fetch_recovers_from_a_single_429() {
    let pool = common::in_memory_pool().await;
    let (_dir, library) = common::temp_library();

    let detail_url = "https://steamcommunity.com/sharedfiles/filedetails/?id=s1";
    let scraper = StubScraper::new()
        .with_profile(ProfileValidation {
            valid: true,
            profile_name: Some("tester".to_string()),
            avatar_url: None,
            is_numeric_id: true,
            resolved_steam_id: Some(STEAM_ID.to_string()),
            error: None,
        })
        .with_games(vec![DiscoveredGame {
            app_id: 220,
            name: "Half-Life 2".to_string(),
            screenshot_count: 1,
        }])
        .with_pages(1, 220, vec![vec![screenshot_ref("s1")], vec![]])
        .with_detail_error_once(detail_url, ScraperError::RateLimited)
        .with_detail(
            detail_url,
            ScreenshotDetail {
                full_url: "https://example.test/s1.bmp".to_string(),
                description: None,
            },
        )
        .with_image(
            "https://example.test/s1.bmp",
            DownloadedImage {
                bytes: common::one_pixel_bmp(1, 2, 3),
                content_type: Some("image/bmp".to_string()),
            },
        );

    let engine = common::fast_engine(pool.clone(), library, scraper);
    let session_id = engine
        .start(
            STEAM_ID.to_string(),
            STEAM_ID.to_string(),
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

    assert!(events
        .iter()
        .any(|e| matches!(e, ImportEvent::ScreenshotComplete { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, ImportEvent::ScreenshotFailed { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        ImportEvent::ImportComplete {
            completed: 1,
            skipped: 0,
            failed: 0,
            ..
        }
    )));
    assert_eq!(common::session_status(&pool, session_id).await, "completed");
}
