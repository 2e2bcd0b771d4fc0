//! The scraper hits a login redirect while enumerating games. The session
//! must fail immediately with `import_error{"authentication required"},
//! done`, be marked `failed`, and write no screenshot rows (scenario 6).

mod common;

use futures::StreamExt;

use gamevault_import::error::ScraperError;
use gamevault_import::import::engine::StartOptions;
use gamevault_import::import::events::ImportEvent;
use gamevault_import::scraper::stub::StubScraper;
use gamevault_import::scraper::{ProfileValidation, SteamCredentials};
use gamevault_import::storage;

const STEAM_ID: &str = "76561198000000006";

#[tokio::test]
async fn auth_required_during_discovery_fails_the_session() {
    let pool = common::in_memory_pool().await;
    let (_dir, library) = common::temp_library();

    let scraper = StubScraper::new()
        .with_profile(ProfileValidation {
            valid: true,
            profile_name: Some("tester".to_string()),
            avatar_url: None,
            is_numeric_id: true,
            resolved_steam_id: Some(STEAM_ID.to_string()),
            error: None,
        })
        .with_discover_error(ScraperError::AuthRequired);

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

    assert!(matches!(events[0], ImportEvent::Status { .. }));
    assert!(matches!(events[1], ImportEvent::ProfileValidated { .. }));
    assert!(matches!(
        events[2],
        ImportEvent::ImportError { ref error } if error == "authentication required"
    ));
    assert!(matches!(events[3], ImportEvent::Done));
    assert_eq!(events.len(), 4);

    assert_eq!(common::session_status(&pool, session_id).await, "failed");

    let row_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM screenshots")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row_count, 0);
}
