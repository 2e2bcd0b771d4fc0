//! Closed error taxonomies for the scraper, ingest worker, and import engine.
//!
//! Each error type exposes a [`Severity`], so the engine's mapping from a
//! failure to a progress event is a single match rather than string
//! comparisons against HTTP status codes or decode-error messages.

use std::fmt;

/// How a failure should be handled by the import engine (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Retry with backoff; caller may succeed on a later attempt.
    Transient,
    /// Record as `failed` for this one item, continue the session.
    PerItemFatal,
    /// Emit `game_error`, continue to the next game.
    PerGameFatal,
    /// Terminate the whole session as `Failed`.
    SessionFatal,
}

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("network error: {0}")]
    TransientNetwork(String),
    #[error("rate limited (429)")]
    RateLimited,
    #[error("authentication required")]
    AuthRequired,
    #[error("could not parse page markup: {0}")]
    Parse(String),
    #[error("not found")]
    NotFound,
    /// A game's screenshot listing never recovered after retries (spec §4.4
    /// "If retries are exhausted on a game's enumeration, that game emits
    /// `game_error` and the session continues to the next game"). Raised by
    /// `enumerate_all_screenshots`, never by a single page/detail/image
    /// fetch in isolation.
    #[error("screenshot enumeration failed: {0}")]
    EnumerationExhausted(String),
}

impl ScraperError {
    pub fn severity(&self) -> Severity {
        match self {
            ScraperError::TransientNetwork(_) => Severity::Transient,
            ScraperError::RateLimited => Severity::Transient,
            ScraperError::AuthRequired => Severity::SessionFatal,
            ScraperError::Parse(_) => Severity::PerItemFatal,
            ScraperError::NotFound => Severity::PerItemFatal,
            ScraperError::EnumerationExhausted(_) => Severity::PerGameFatal,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("unrecognized image format")]
    UnsupportedFormat,
    #[error("image failed to decode: {0}")]
    Decode(String),
    #[error("image exceeds the configured size limit")]
    Oversized,
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl IngestError {
    pub fn severity(&self) -> Severity {
        match self {
            IngestError::UnsupportedFormat | IngestError::Decode(_) | IngestError::Oversized => {
                Severity::PerItemFatal
            }
            IngestError::Io(_) | IngestError::Db(_) => Severity::SessionFatal,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Scraper(#[from] ScraperError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("import session was cancelled")]
    Cancelled,
}

impl ImportError {
    pub fn severity(&self) -> Severity {
        match self {
            ImportError::Scraper(e) => e.severity(),
            ImportError::Ingest(e) => e.severity(),
            ImportError::Db(_) => Severity::SessionFatal,
            ImportError::Cancelled => Severity::SessionFatal, // handled separately by callers
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Transient => "transient",
            Severity::PerItemFatal => "per_item_fatal",
            Severity::PerGameFatal => "per_game_fatal",
            Severity::SessionFatal => "session_fatal",
        };
        write!(f, "{}", s)
    }
}
