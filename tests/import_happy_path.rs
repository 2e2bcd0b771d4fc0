//! User `76561198000000001` selects app `220` (reported count 3), the
//! scraper returns three distinct screenshots, and nothing has been
//! imported before. Every screenshot should complete, with one row, one
//! original, and two thumbnails per screenshot on disk afterward.

mod common;

use futures::StreamExt;

use gamevault_import::import::engine::StartOptions;
use gamevault_import::import::events::ImportEvent;
use gamevault_import::scraper::stub::{screenshot_ref, StubScraper};
use gamevault_import::scraper::{DiscoveredGame, DownloadedImage, ProfileValidation, ScreenshotDetail, SteamCredentials};
use gamevault_import::storage;

#[tokio::test]
async fn happy_path_imports_all_three_screenshots() {
    let pool = common::in_memory_pool().await;
    let (_dir, library) = common::temp_library();

    let mut scraper = StubScraper::new()
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
            screenshot_count: 3,
        }])
        .with_pages(
            1,
            220,
            vec![
                vec![
                    screenshot_ref("s1"),
                    screenshot_ref("s2"),
                    screenshot_ref("s3"),
                ],
                vec![],
            ],
        );

    let colors = [(255, 0, 0), (0, 255, 0), (0, 0, 255)];
    for (i, (r, g, b)) in colors.iter().enumerate() {
        let id = format!("s{}", i + 1);
        let detail_url = format!("https://steamcommunity.com/sharedfiles/filedetails/?id={}", id);
        let full_url = format!("https://example.test/{}.bmp", id);
        scraper = scraper
            .with_detail(
                &detail_url,
                ScreenshotDetail {
                    full_url: full_url.clone(),
                    description: None,
                },
            )
            .with_image(
                &full_url,
                DownloadedImage {
                    bytes: common::one_pixel_bmp(*r, *g, *b),
                    content_type: Some("image/bmp".to_string()),
                },
            );
    }

    let engine = common::fast_engine(pool.clone(), library, scraper);

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

    assert!(matches!(events[0], ImportEvent::Status { .. }));
    assert!(matches!(events[1], ImportEvent::ProfileValidated { .. }));
    assert!(matches!(
        events[2],
        ImportEvent::GamesDiscovered {
            total_games: 1,
            total_screenshots: 3
        }
    ));
    assert!(matches!(events[3], ImportEvent::GameStart { app_id: 220, .. }));

    let complete_count = events
        .iter()
        .filter(|e| matches!(e, ImportEvent::ScreenshotComplete { .. }))
        .count();
    assert_eq!(complete_count, 3);

    assert!(events.iter().any(|e| matches!(
        e,
        ImportEvent::GameComplete {
            app_id: 220,
            completed: 3,
            skipped: 0,
            failed: 0,
            ..
        }
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        ImportEvent::ImportComplete {
            completed: 3,
            skipped: 0,
            failed: 0,
            total_games: 1,
        }
    )));
    assert!(matches!(events.last(), Some(ImportEvent::Done)));

    assert_eq!(common::session_status(&pool, session_id).await, "completed");

    let game = storage::games::find_by_steam_app_id(&pool, 220)
        .await
        .unwrap()
        .expect("game row created");
    let filenames = storage::screenshots::filenames_for_game(&pool, game.id)
        .await
        .unwrap();
    assert_eq!(filenames.len(), 3);

    let row_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM screenshots WHERE game_id = ?1")
        .bind(game.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row_count, 3);
}
