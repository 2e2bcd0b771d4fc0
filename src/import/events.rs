//! Typed progress events (spec §4.5). `ImportEvent` is the in-process value;
//! [`ImportEvent::kind`] and [`ImportEvent::payload_json`] are what actually
//! cross the wire — as the SSE `event:`/`data:` pair and as the `kind`/
//! `payload_json` columns of the durable `import_events` log, so both
//! representations always agree.

use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
pub enum ImportEvent {
    Status {
        message: String,
    },
    ProfileValidated {
        profile_name: String,
        avatar_url: Option<String>,
    },
    GamesDiscovered {
        total_games: u32,
        total_screenshots: u32,
    },
    GameStart {
        app_id: u32,
        name: String,
    },
    ScreenshotComplete {
        game_name: String,
        overall_progress: u32,
    },
    ScreenshotSkipped {
        game_name: String,
        reason: String,
    },
    ScreenshotFailed {
        game_name: String,
        error: String,
    },
    GameComplete {
        app_id: u32,
        completed: u32,
        skipped: u32,
        failed: u32,
        overall_completed: u32,
        overall_skipped: u32,
        overall_failed: u32,
    },
    GameError {
        app_id: u32,
        error: String,
    },
    ImportComplete {
        completed: u32,
        skipped: u32,
        failed: u32,
        total_games: u32,
    },
    ImportCancelled,
    ImportError {
        error: String,
    },
    Done,
}

impl ImportEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ImportEvent::Status { .. } => "status",
            ImportEvent::ProfileValidated { .. } => "profile_validated",
            ImportEvent::GamesDiscovered { .. } => "games_discovered",
            ImportEvent::GameStart { .. } => "game_start",
            ImportEvent::ScreenshotComplete { .. } => "screenshot_complete",
            ImportEvent::ScreenshotSkipped { .. } => "screenshot_skipped",
            ImportEvent::ScreenshotFailed { .. } => "screenshot_failed",
            ImportEvent::GameComplete { .. } => "game_complete",
            ImportEvent::GameError { .. } => "game_error",
            ImportEvent::ImportComplete { .. } => "import_complete",
            ImportEvent::ImportCancelled => "import_cancelled",
            ImportEvent::ImportError { .. } => "import_error",
            ImportEvent::Done => "done",
        }
    }

    /// Terminal events (and `done`) are never dropped by the bus's
    /// backpressure policy (spec §4.5 "Backpressure").
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportEvent::ImportComplete { .. }
                | ImportEvent::ImportCancelled
                | ImportEvent::ImportError { .. }
                | ImportEvent::Done
        )
    }

    pub fn payload_json(&self) -> String {
        let value = match self {
            ImportEvent::Status { message } => json!({ "message": message }),
            ImportEvent::ProfileValidated {
                profile_name,
                avatar_url,
            } => json!({ "profile_name": profile_name, "avatar_url": avatar_url }),
            ImportEvent::GamesDiscovered {
                total_games,
                total_screenshots,
            } => json!({ "total_games": total_games, "total_screenshots": total_screenshots }),
            ImportEvent::GameStart { app_id, name } => {
                json!({ "app_id": app_id, "name": name })
            }
            ImportEvent::ScreenshotComplete {
                game_name,
                overall_progress,
            } => json!({ "game_name": game_name, "overall_progress": overall_progress }),
            ImportEvent::ScreenshotSkipped { game_name, reason } => {
                json!({ "game_name": game_name, "reason": reason })
            }
            ImportEvent::ScreenshotFailed { game_name, error } => {
                json!({ "game_name": game_name, "error": error })
            }
            ImportEvent::GameComplete {
                app_id,
                completed,
                skipped,
                failed,
                overall_completed,
                overall_skipped,
                overall_failed,
            } => json!({
                "app_id": app_id,
                "completed": completed,
                "skipped": skipped,
                "failed": failed,
                "overall_completed": overall_completed,
                "overall_skipped": overall_skipped,
                "overall_failed": overall_failed,
            }),
            ImportEvent::GameError { app_id, error } => {
                json!({ "app_id": app_id, "error": error })
            }
            ImportEvent::ImportComplete {
                completed,
                skipped,
                failed,
                total_games,
            } => json!({
                "completed": completed,
                "skipped": skipped,
                "failed": failed,
                "total_games": total_games,
            }),
            ImportEvent::ImportCancelled => json!({}),
            ImportEvent::ImportError { error } => json!({ "error": error }),
            ImportEvent::Done => json!({}),
        };
        value.to_string()
    }

    /// Reconstruct an event from a `(kind, payload_json)` pair, as read back
    /// from the durable log for replay. `None` on an unrecognized kind or a
    /// payload shape mismatch — callers skip rather than fail the stream.
    pub fn from_parts(kind: &str, payload_json: &str) -> Option<Self> {
        let v: serde_json::Value = serde_json::from_str(payload_json).ok()?;
        let s = |key: &str| v.get(key)?.as_str().map(str::to_string);
        let u = |key: &str| v.get(key)?.as_u64().map(|n| n as u32);

        Some(match kind {
            "status" => ImportEvent::Status { message: s("message")? },
            "profile_validated" => ImportEvent::ProfileValidated {
                profile_name: s("profile_name")?,
                avatar_url: s("avatar_url"),
            },
            "games_discovered" => ImportEvent::GamesDiscovered {
                total_games: u("total_games")?,
                total_screenshots: u("total_screenshots")?,
            },
            "game_start" => ImportEvent::GameStart {
                app_id: u("app_id")?,
                name: s("name")?,
            },
            "screenshot_complete" => ImportEvent::ScreenshotComplete {
                game_name: s("game_name")?,
                overall_progress: u("overall_progress")?,
            },
            "screenshot_skipped" => ImportEvent::ScreenshotSkipped {
                game_name: s("game_name")?,
                reason: s("reason")?,
            },
            "screenshot_failed" => ImportEvent::ScreenshotFailed {
                game_name: s("game_name")?,
                error: s("error")?,
            },
            "game_complete" => ImportEvent::GameComplete {
                app_id: u("app_id")?,
                completed: u("completed")?,
                skipped: u("skipped")?,
                failed: u("failed")?,
                overall_completed: u("overall_completed")?,
                overall_skipped: u("overall_skipped")?,
                overall_failed: u("overall_failed")?,
            },
            "game_error" => ImportEvent::GameError {
                app_id: u("app_id")?,
                error: s("error")?,
            },
            "import_complete" => ImportEvent::ImportComplete {
                completed: u("completed")?,
                skipped: u("skipped")?,
                failed: u("failed")?,
                total_games: u("total_games")?,
            },
            "import_cancelled" => ImportEvent::ImportCancelled,
            "import_error" => ImportEvent::ImportError { error: s("error")? },
            "done" => ImportEvent::Done,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_events_are_flagged() {
        assert!(ImportEvent::Done.is_terminal());
        assert!(ImportEvent::ImportCancelled.is_terminal());
        assert!(!ImportEvent::Status { message: "hi".into() }.is_terminal());
    }

    #[test]
    fn round_trips_through_kind_and_payload() {
        let event = ImportEvent::GameStart {
            app_id: 220,
            name: "Half-Life 2".to_string(),
        };
        let restored = ImportEvent::from_parts(event.kind(), &event.payload_json()).unwrap();
        assert_eq!(event, restored);
    }

    #[test]
    fn from_parts_rejects_unknown_kind() {
        assert!(ImportEvent::from_parts("not_a_real_kind", "{}").is_none());
    }
}
