//! `reqwest` + `scraper`/`regex`-backed implementation of [`SteamScraper`]
//! against the unofficial `steamcommunity.com` HTML surfaces.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use regex::Regex;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};

use crate::error::ScraperError;

use super::{
    DiscoveredGame, DownloadedImage, ProfileValidation, ScreenshotDetail, ScreenshotRef,
    SteamCredentials, SteamScraper,
};

const BASE_URL: &str = "https://steamcommunity.com";
const MATURE_NOTICE_MARKER: &str = "mature_content_notice";

pub struct SteamHttpScraper {
    client: Client,
}

impl SteamHttpScraper {
    pub fn new() -> Self {
        SteamHttpScraper {
            client: Client::builder()
                .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
                .timeout(Duration::from_secs(30))
                .redirect(reqwest::redirect::Policy::limited(5))
                .build()
                .expect("failed to build Steam HTTP client"),
        }
    }

    fn profile_url(&self, input: &str) -> String {
        if is_numeric_steam_id(input) {
            format!("{}/profiles/{}/", BASE_URL, input)
        } else {
            format!("{}/id/{}/", BASE_URL, input)
        }
    }

    async fn get_html(&self, url: &str, creds: &SteamCredentials) -> Result<String, ScraperError> {
        let mut req = self.client.get(url);
        if let Some(cookie) = cookie_header(creds) {
            req = req.header(reqwest::header::COOKIE, cookie);
        }

        let resp = req.send().await.map_err(classify_request_error)?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ScraperError::RateLimited);
        }
        if status.is_server_error() {
            return Err(ScraperError::TransientNetwork(format!(
                "server returned {}",
                status
            )));
        }
        if status == StatusCode::UNAUTHORIZED || looks_like_login_redirect(resp.url().as_str()) {
            return Err(ScraperError::AuthRequired);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ScraperError::NotFound);
        }
        if !status.is_success() {
            return Err(ScraperError::Parse(format!(
                "unexpected status {}",
                status
            )));
        }

        let body = resp.text().await.map_err(classify_request_error)?;
        resolve_mature_notice(&self.client, url, creds, body).await
    }
}

impl Default for SteamHttpScraper {
    fn default() -> Self {
        Self::new()
    }
}

/// Steam gates some screenshots behind a "this content may be inappropriate"
/// interstitial. Detect it and replay the request with the view-anyway form
/// parameters built from the page's own `sessionid` (spec §4.1.3).
async fn resolve_mature_notice(
    client: &Client,
    url: &str,
    creds: &SteamCredentials,
    body: String,
) -> Result<String, ScraperError> {
    if !body.contains(MATURE_NOTICE_MARKER) {
        return Ok(body);
    }

    let session_id = creds
        .session_id
        .clone()
        .or_else(|| extract_session_id(&body))
        .ok_or(ScraperError::AuthRequired)?;

    let mut req = client
        .post(url)
        .form(&[("sessionid", session_id.as_str()), ("view_anyway", "1")]);
    if let Some(cookie) = cookie_header(creds) {
        req = req.header(reqwest::header::COOKIE, cookie);
    }

    let resp = req.send().await.map_err(classify_request_error)?;
    if !resp.status().is_success() {
        return Err(ScraperError::Parse(
            "mature content notice could not be bypassed".into(),
        ));
    }
    resp.text().await.map_err(classify_request_error)
}

fn extract_session_id(body: &str) -> Option<String> {
    let re = Regex::new(r#"g_sessionID\s*=\s*"([a-f0-9]+)""#).ok()?;
    re.captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn cookie_header(creds: &SteamCredentials) -> Option<String> {
    match (&creds.steam_login_secure, &creds.session_id) {
        (None, None) => None,
        (login, session) => {
            let mut parts = Vec::new();
            if let Some(v) = login {
                parts.push(format!("steamLoginSecure={}", v));
            }
            if let Some(v) = session {
                parts.push(format!("sessionid={}", v));
            }
            Some(parts.join("; "))
        }
    }
}

fn looks_like_login_redirect(url: &str) -> bool {
    url.contains("/login/") || url.contains("openid/login")
}

fn classify_request_error(e: reqwest::Error) -> ScraperError {
    ScraperError::TransientNetwork(e.to_string())
}

fn is_numeric_steam_id(input: &str) -> bool {
    input.len() >= 15 && input.chars().all(|c| c.is_ascii_digit())
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid CSS")
}

#[async_trait]
impl SteamScraper for SteamHttpScraper {
    async fn validate_profile(
        &self,
        input: &str,
        creds: &SteamCredentials,
    ) -> Result<ProfileValidation, ScraperError> {
        let url = self.profile_url(input);
        let html = match self.get_html(&url, creds).await {
            Ok(html) => html,
            Err(ScraperError::NotFound) => {
                return Ok(ProfileValidation {
                    valid: false,
                    profile_name: None,
                    avatar_url: None,
                    is_numeric_id: is_numeric_steam_id(input),
                    resolved_steam_id: None,
                    error: Some("profile not found".to_string()),
                })
            }
            Err(e) => return Err(e),
        };

        let doc = Html::parse_document(&html);
        let name = doc
            .select(&selector(".actual_persona_name"))
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string());
        let avatar = doc
            .select(&selector(".playerAvatarAutoSizeInner img"))
            .next()
            .and_then(|el| el.value().attr("src"))
            .map(|s| s.to_string());
        let resolved_steam_id = extract_steam_id64(&html);

        if name.is_none() {
            return Ok(ProfileValidation {
                valid: false,
                profile_name: None,
                avatar_url: None,
                is_numeric_id: is_numeric_steam_id(input),
                resolved_steam_id: None,
                error: Some("profile markup not recognized".to_string()),
            });
        }

        Ok(ProfileValidation {
            valid: true,
            profile_name: name,
            avatar_url: avatar,
            is_numeric_id: is_numeric_steam_id(input),
            resolved_steam_id,
            error: None,
        })
    }

    async fn discover_games(
        &self,
        steam_id: &str,
        creds: &SteamCredentials,
    ) -> Result<Vec<DiscoveredGame>, ScraperError> {
        let url = format!("{}/profiles/{}/screenshots/", BASE_URL, steam_id);
        let html = self.get_html(&url, creds).await?;
        let doc = Html::parse_document(&html);

        let row_sel = selector(".games_list_tabs .gameListRow, .gameListRow");
        let name_sel = selector(".gameListRowItemName");
        let count_sel = selector(".gameListRowItemCount");

        let mut games = Vec::new();
        for row in doc.select(&row_sel) {
            let app_id = row
                .value()
                .attr("data-appid")
                .and_then(|v| v.parse::<u32>().ok());
            let Some(app_id) = app_id else { continue };

            let name = row
                .select(&name_sel)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_else(|| format!("App {}", app_id));

            let screenshot_count = row
                .select(&count_sel)
                .next()
                .and_then(|el| parse_count(&el.text().collect::<String>()))
                .unwrap_or(0);

            games.push(DiscoveredGame {
                app_id,
                name,
                screenshot_count,
            });
        }

        if games.is_empty() && html.contains("noScreenshotsYet") {
            return Ok(Vec::new());
        }
        if games.is_empty() {
            return Err(ScraperError::Parse(
                "screenshots landing page markup not recognized".into(),
            ));
        }
        Ok(games)
    }

    async fn fetch_screenshot_page(
        &self,
        steam_id: &str,
        app_id: u32,
        page: u32,
        creds: &SteamCredentials,
    ) -> Result<Vec<ScreenshotRef>, ScraperError> {
        let url = format!(
            "{}/profiles/{}/screenshots/?appid={}&p={}",
            BASE_URL, steam_id, app_id, page
        );
        let html = self.get_html(&url, creds).await?;
        let doc = Html::parse_document(&html);

        let item_sel = selector(".profile_media_item");
        let link_sel = selector(".profile_media_item_link");
        let thumb_sel = selector("img.profile_media_item_thumbnail, img");
        let stamp_sel = selector(".imageWallTimeStamp");

        let mut refs = Vec::new();
        for item in doc.select(&item_sel) {
            let Some(steam_screenshot_id) = item.value().attr("data-publishedfileid") else {
                continue;
            };
            let Some(detail_url) = item
                .select(&link_sel)
                .next()
                .and_then(|el| el.value().attr("href"))
            else {
                continue;
            };
            let thumb_url = item
                .select(&thumb_sel)
                .next()
                .and_then(|el| el.value().attr("src"))
                .unwrap_or_default()
                .to_string();
            let taken_at = item
                .select(&stamp_sel)
                .next()
                .map(|el| el.text().collect::<String>())
                .and_then(|s| parse_steam_timestamp(s.trim()));

            refs.push(ScreenshotRef {
                steam_screenshot_id: steam_screenshot_id.to_string(),
                detail_url: detail_url.to_string(),
                thumb_url,
                taken_at,
            });
        }

        Ok(refs)
    }

    async fn fetch_screenshot_detail(
        &self,
        detail_url: &str,
        creds: &SteamCredentials,
    ) -> Result<ScreenshotDetail, ScraperError> {
        let html = self.get_html(detail_url, creds).await?;
        let doc = Html::parse_document(&html);

        let full_url = doc
            .select(&selector("#ActualMedia"))
            .next()
            .and_then(|el| el.value().attr("src"))
            .map(|s| s.to_string())
            .ok_or_else(|| ScraperError::Parse("screenshot detail markup not recognized".into()))?;

        let description = doc
            .select(&selector(".screenshotDescription"))
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(ScreenshotDetail {
            full_url,
            description,
        })
    }

    async fn download_image(
        &self,
        url: &str,
        creds: &SteamCredentials,
    ) -> Result<DownloadedImage, ScraperError> {
        let mut req = self.client.get(url);
        if let Some(cookie) = cookie_header(creds) {
            req = req.header(reqwest::header::COOKIE, cookie);
        }

        let resp = req.send().await.map_err(classify_request_error)?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ScraperError::RateLimited);
        }
        if status.is_server_error() {
            return Err(ScraperError::TransientNetwork(format!(
                "server returned {}",
                status
            )));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ScraperError::NotFound);
        }
        if !status.is_success() {
            return Err(ScraperError::Parse(format!(
                "unexpected status {}",
                status
            )));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk.map_err(classify_request_error)?);
        }

        Ok(DownloadedImage { bytes, content_type })
    }
}

fn extract_steam_id64(html: &str) -> Option<String> {
    let re = Regex::new(r#"g_rgProfileData\s*=\s*\{"steamid":"(\d+)""#).ok()?;
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn parse_count(text: &str) -> Option<u32> {
    text.trim().replace(',', "").parse().ok()
}

/// Steam renders screenshot timestamps like "Jul 27, 2026 @ 1:23pm" in the
/// viewer's local time with no machine-readable attribute; best-effort parse,
/// `None` on anything unrecognized rather than failing the whole item.
fn parse_steam_timestamp(text: &str) -> Option<DateTime<Utc>> {
    for fmt in ["%b %e, %Y @ %l:%M%P", "%b %e @ %l:%M%P"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_numeric_steam_id_distinguishes_vanity_from_id64() {
        assert!(is_numeric_steam_id("76561197960287930"));
        assert!(!is_numeric_steam_id("gaben"));
    }

    #[test]
    fn cookie_header_joins_both_cookies() {
        let creds = SteamCredentials {
            steam_login_secure: Some("abc".to_string()),
            session_id: Some("def".to_string()),
        };
        assert_eq!(
            cookie_header(&creds),
            Some("steamLoginSecure=abc; sessionid=def".to_string())
        );
    }

    #[test]
    fn cookie_header_is_none_when_anonymous() {
        assert_eq!(cookie_header(&SteamCredentials::anonymous()), None);
    }

    #[test]
    fn parse_count_strips_thousands_separators() {
        assert_eq!(parse_count("1,234"), Some(1234));
    }

    #[test]
    fn extract_session_id_finds_embedded_js_var() {
        let body = r#"<script>g_sessionID = "deadbeef";</script>"#;
        assert_eq!(extract_session_id(body), Some("deadbeef".to_string()));
    }
}
