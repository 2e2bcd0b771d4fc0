//! Steam Scraper (C3): HTML fetch + parse for profile validation, game
//! discovery, screenshot enumeration, and image download against the
//! unofficial `steamcommunity.com` surfaces. No official Steam Web API key
//! is used or required — everything here is public/session-cookie HTML.

mod retry;
mod steam;
pub mod stub;

pub use retry::{with_retry, RetryPolicy};
pub use steam::SteamHttpScraper;
pub use stub::StubScraper;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{ScraperError, Severity};

/// Session cookies copied from the user's browser. Never persisted —
/// callers hold these only for the lifetime of one import session.
#[derive(Clone)]
pub struct SteamCredentials {
    pub steam_login_secure: Option<String>,
    pub session_id: Option<String>,
}

impl SteamCredentials {
    pub fn anonymous() -> Self {
        SteamCredentials {
            steam_login_secure: None,
            session_id: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.steam_login_secure.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileValidation {
    pub valid: bool,
    pub profile_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_numeric_id: bool,
    pub resolved_steam_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredGame {
    pub app_id: u32,
    pub name: String,
    pub screenshot_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotRef {
    pub steam_screenshot_id: String,
    pub detail_url: String,
    pub thumb_url: String,
    pub taken_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotDetail {
    pub full_url: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DownloadedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// One page of the screenshot listing for `(steam_id, app_id)`. Enumeration
/// stops when a page yields zero screenshot ids not already seen by the
/// caller (spec §4.1.3).
#[async_trait]
pub trait SteamScraper: Send + Sync {
    async fn validate_profile(
        &self,
        input: &str,
        creds: &SteamCredentials,
    ) -> Result<ProfileValidation, ScraperError>;

    async fn discover_games(
        &self,
        steam_id: &str,
        creds: &SteamCredentials,
    ) -> Result<Vec<DiscoveredGame>, ScraperError>;

    async fn fetch_screenshot_page(
        &self,
        steam_id: &str,
        app_id: u32,
        page: u32,
        creds: &SteamCredentials,
    ) -> Result<Vec<ScreenshotRef>, ScraperError>;

    async fn fetch_screenshot_detail(
        &self,
        detail_url: &str,
        creds: &SteamCredentials,
    ) -> Result<ScreenshotDetail, ScraperError>;

    async fn download_image(
        &self,
        url: &str,
        creds: &SteamCredentials,
    ) -> Result<DownloadedImage, ScraperError>;
}

/// Walk every page for `(steam_id, app_id)` until a page contributes no new
/// ids, returning the full, deduplicated list. This is the shared driving
/// loop the import engine uses; it lives here (rather than duplicated per
/// implementation) because the termination rule is part of the scraper's
/// contract, not an implementation detail.
pub async fn enumerate_all_screenshots(
    scraper: &dyn SteamScraper,
    steam_id: &str,
    app_id: u32,
    creds: &SteamCredentials,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<Vec<ScreenshotRef>, ScraperError> {
    let mut seen = std::collections::HashSet::new();
    let mut all = Vec::new();
    let mut page = 1;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let refs = match with_retry(RetryPolicy::default(), cancel, || {
            scraper.fetch_screenshot_page(steam_id, app_id, page, creds)
        })
        .await
        {
            Ok(refs) => refs,
            // AuthRequired fails the whole session regardless of where it
            // surfaces; anything else means this game's enumeration never
            // recovered, which is per-game rather than session-fatal.
            Err(e) if e.severity() == Severity::SessionFatal => return Err(e),
            Err(e) => return Err(ScraperError::EnumerationExhausted(e.to_string())),
        };

        let mut new_count = 0;
        for r in refs {
            if seen.insert(r.steam_screenshot_id.clone()) {
                new_count += 1;
                all.push(r);
            }
        }

        if new_count == 0 {
            break;
        }
        page += 1;
    }

    Ok(all)
}
