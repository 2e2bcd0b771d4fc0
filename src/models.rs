//! Request/response DTOs for the HTTP surface in spec §6.1. Kept separate
//! from the `storage` row types: these shapes are the wire contract, not
//! the persistence layout, and the two are free to diverge.

use serde::{Deserialize, Serialize};

use crate::scraper::{DiscoveredGame, ProfileValidation, SteamCredentials};

/// Shared body for the three `/api/steam/*` endpoints that accept
/// credentials (spec §6.1): validate, games, and import.
#[derive(Debug, Deserialize)]
pub struct SteamCredentialsBody {
    pub user_id: String,
    pub steam_login_secure: Option<String>,
    pub session_id: Option<String>,
}

impl SteamCredentialsBody {
    pub fn credentials(&self) -> SteamCredentials {
        SteamCredentials {
            steam_login_secure: self.steam_login_secure.clone(),
            session_id: self.session_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ImportRequestBody {
    pub user_id: String,
    pub steam_login_secure: Option<String>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub game_ids: Vec<u32>,
    #[serde(default)]
    pub is_numeric_id: bool,
}

impl ImportRequestBody {
    pub fn credentials(&self) -> SteamCredentials {
        SteamCredentials {
            steam_login_secure: self.steam_login_secure.clone(),
            session_id: self.session_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SteamValidateResponse {
    pub valid: bool,
    pub profile_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_numeric_id: bool,
    pub error: Option<String>,
}

impl From<ProfileValidation> for SteamValidateResponse {
    fn from(p: ProfileValidation) -> Self {
        SteamValidateResponse {
            valid: p.valid,
            profile_name: p.profile_name,
            avatar_url: p.avatar_url,
            is_numeric_id: p.is_numeric_id,
            error: p.error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GameSummary {
    pub app_id: u32,
    pub name: String,
    pub screenshot_count: u32,
}

impl From<DiscoveredGame> for GameSummary {
    fn from(g: DiscoveredGame) -> Self {
        GameSummary {
            app_id: g.app_id,
            name: g.name,
            screenshot_count: g.screenshot_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionStartedResponse {
    pub session_id: i64,
}

#[derive(Debug, Serialize)]
pub struct UploadStartedResponse {
    pub task_id: i64,
}
