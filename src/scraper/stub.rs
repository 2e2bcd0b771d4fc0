//! In-memory [`SteamScraper`] for tests: the import engine and ingest worker
//! are exercised end-to-end without touching the network, by constructing a
//! `StubScraper` with canned responses instead of a [`SteamHttpScraper`].

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::error::ScraperError;

use super::{
    DiscoveredGame, DownloadedImage, ProfileValidation, ScreenshotDetail, ScreenshotRef,
    SteamCredentials, SteamScraper,
};

pub fn screenshot_ref(id: &str) -> ScreenshotRef {
    ScreenshotRef {
        steam_screenshot_id: id.to_string(),
        detail_url: format!("https://steamcommunity.com/sharedfiles/filedetails/?id={}", id),
        thumb_url: format!("https://example.test/{}_thumb.jpg", id),
        taken_at: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
    }
}

#[derive(Default)]
pub struct StubScraper {
    profile: Mutex<Option<ProfileValidation>>,
    games: Mutex<Vec<DiscoveredGame>>,
    discover_error: Mutex<Option<ScraperError>>,
    pages: Mutex<HashMap<u32, Vec<Vec<ScreenshotRef>>>>,
    page_calls: Mutex<HashMap<u32, usize>>,
    details: Mutex<HashMap<String, ScreenshotDetail>>,
    /// Errors to return on the next N calls to `fetch_screenshot_detail` for
    /// a given url, consumed front-to-back, before falling back to the
    /// registered success response. Models a flaky upstream for retry tests.
    detail_errors: Mutex<HashMap<String, VecDeque<ScraperError>>>,
    images: Mutex<HashMap<String, DownloadedImage>>,
    image_errors: Mutex<HashMap<String, VecDeque<ScraperError>>>,
}

impl StubScraper {
    pub fn new() -> Self {
        StubScraper::default()
    }

    pub fn with_profile(self, profile: ProfileValidation) -> Self {
        *self.profile.lock().unwrap() = Some(profile);
        self
    }

    pub fn with_games(self, games: Vec<DiscoveredGame>) -> Self {
        *self.games.lock().unwrap() = games;
        self
    }

    /// Make `discover_games` fail with `err` instead of returning the
    /// registered games list.
    pub fn with_discover_error(self, err: ScraperError) -> Self {
        *self.discover_error.lock().unwrap() = Some(err);
        self
    }

    /// Queue `err` to be returned on the next call to
    /// `fetch_screenshot_detail(detail_url, ..)`, before the registered
    /// success response is served.
    pub fn with_detail_error_once(self, detail_url: &str, err: ScraperError) -> Self {
        self.detail_errors
            .lock()
            .unwrap()
            .entry(detail_url.to_string())
            .or_default()
            .push_back(err);
        self
    }

    /// Queue `err` to be returned on the next call to `download_image(url,
    /// ..)`, before the registered success response is served.
    pub fn with_image_error_once(self, url: &str, err: ScraperError) -> Self {
        self.image_errors
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(err);
        self
    }

    /// Register the sequence of pages `fetch_screenshot_page` should return,
    /// in order, for `app_id`. The `_steam_id` argument exists only to
    /// mirror the trait's signature shape at call sites.
    pub fn with_pages(self, _steam_id: u32, app_id: u32, pages: Vec<Vec<ScreenshotRef>>) -> Self {
        self.pages.lock().unwrap().insert(app_id, pages);
        self
    }

    pub fn with_detail(self, detail_url: &str, detail: ScreenshotDetail) -> Self {
        self.details
            .lock()
            .unwrap()
            .insert(detail_url.to_string(), detail);
        self
    }

    pub fn with_image(self, url: &str, image: DownloadedImage) -> Self {
        self.images.lock().unwrap().insert(url.to_string(), image);
        self
    }
}

#[async_trait]
impl SteamScraper for StubScraper {
    async fn validate_profile(
        &self,
        _input: &str,
        _creds: &SteamCredentials,
    ) -> Result<ProfileValidation, ScraperError> {
        Ok(self.profile.lock().unwrap().clone().unwrap_or(ProfileValidation {
            valid: true,
            profile_name: Some("stub user".to_string()),
            avatar_url: None,
            is_numeric_id: true,
            resolved_steam_id: Some("1".to_string()),
            error: None,
        }))
    }

    async fn discover_games(
        &self,
        _steam_id: &str,
        _creds: &SteamCredentials,
    ) -> Result<Vec<DiscoveredGame>, ScraperError> {
        if let Some(err) = self.discover_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(self.games.lock().unwrap().clone())
    }

    async fn fetch_screenshot_page(
        &self,
        _steam_id: &str,
        app_id: u32,
        _page: u32,
        _creds: &SteamCredentials,
    ) -> Result<Vec<ScreenshotRef>, ScraperError> {
        let mut calls = self.page_calls.lock().unwrap();
        let idx = calls.entry(app_id).or_insert(0);
        let pages = self.pages.lock().unwrap();
        let result = pages
            .get(&app_id)
            .and_then(|p| p.get(*idx))
            .cloned()
            .unwrap_or_default();
        *idx += 1;
        Ok(result)
    }

    async fn fetch_screenshot_detail(
        &self,
        detail_url: &str,
        _creds: &SteamCredentials,
    ) -> Result<ScreenshotDetail, ScraperError> {
        if let Some(err) = self
            .detail_errors
            .lock()
            .unwrap()
            .get_mut(detail_url)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        Ok(self
            .details
            .lock()
            .unwrap()
            .get(detail_url)
            .cloned()
            .unwrap_or(ScreenshotDetail {
                full_url: detail_url.to_string(),
                description: None,
            }))
    }

    async fn download_image(
        &self,
        url: &str,
        _creds: &SteamCredentials,
    ) -> Result<DownloadedImage, ScraperError> {
        if let Some(err) = self
            .image_errors
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        Ok(self.images.lock().unwrap().get(url).cloned().unwrap_or(
            DownloadedImage {
                bytes: Vec::new(),
                content_type: Some("image/png".to_string()),
            },
        ))
    }
}
