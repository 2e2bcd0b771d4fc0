//! Shared ingest worker (C7): turns raw image bytes plus source metadata
//! into a persisted screenshot row with originals and thumbnails on disk.
//! Used by both the Steam import engine and the manual upload endpoint.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::error::IngestError;
use crate::library::Library;
use crate::storage::screenshots::{self, NewScreenshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Upload,
    SteamImport,
    SteamLocal,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Upload => "upload",
            Source::SteamImport => "steam_import",
            Source::SteamLocal => "steam_local",
        }
    }
}

/// Everything the ingest worker needs about one incoming screenshot.
pub struct IngestInput<'a> {
    pub bytes: Vec<u8>,
    pub source: Source,
    pub game_id: i64,
    pub game_folder_name: &'a str,
    pub claimed_filename: &'a str,
    pub steam_screenshot_id: Option<&'a str>,
    pub steam_description: Option<&'a str>,
    pub taken_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub enum Outcome {
    Completed { screenshot_id: i64 },
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    DuplicateId,
    DuplicateHash,
    DuplicateHashRaced,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::DuplicateId => "duplicate_id",
            SkipReason::DuplicateHash => "duplicate_hash",
            SkipReason::DuplicateHashRaced => "duplicate_hash_raced",
        }
    }
}

/// Run the full ingest pipeline (spec §4.3 steps 1-8). Pure with respect to
/// the progress bus — the caller is responsible for publishing events.
pub async fn ingest(
    pool: &SqlitePool,
    library: &Library,
    thumbnail_quality: u8,
    input: IngestInput<'_>,
) -> Result<Outcome, IngestError> {
    // Step 1: validate magic bytes.
    let format = crate::library::accepted_format(&input.bytes)
        .ok_or(IngestError::UnsupportedFormat)?;

    // Step 2: content hash.
    let file_hash = hex_sha256(&input.bytes);

    // Step 3: dedup check, in order.
    if let Some(steam_id) = input.steam_screenshot_id {
        if screenshots::find_by_steam_id(pool, input.game_id, steam_id)
            .await?
            .is_some()
        {
            return Ok(Outcome::Skipped {
                reason: SkipReason::DuplicateId,
            });
        }
    }
    if screenshots::find_by_hash(pool, input.game_id, &file_hash)
        .await?
        .is_some()
    {
        return Ok(Outcome::Skipped {
            reason: SkipReason::DuplicateHash,
        });
    }

    // Step 4: decode.
    let decoded = image::load_from_memory_with_format(&input.bytes, format)
        .map_err(|e| IngestError::Decode(e.to_string()))?;
    let (width, height) = (decoded.width(), decoded.height());
    let exif_data = extract_exif_segment(&input.bytes);

    // Step 5: derive canonical filename.
    let filename = library
        .unique_filename(input.game_folder_name, input.claimed_filename, &file_hash)
        .await;

    // Step 6: write the original. Anything written from here on is rolled
    // back on a later failure (spec: "Failures are never partial").
    let original_path = library
        .write_original(input.game_folder_name, &filename, &input.bytes)
        .await?;

    // Step 8: insert the row. We need the id before naming thumbnails, so
    // insert with temporary thumbnail paths, generate thumbnails keyed by
    // the real id, then patch the row's thumbnail paths in.
    let file_size = input.bytes.len() as i64;
    let insert_result = screenshots::insert(
        pool,
        NewScreenshot {
            game_id: input.game_id,
            filename: &filename,
            file_path: path_str(&original_path),
            thumb_sm_path: "",
            thumb_md_path: "",
            file_size,
            width,
            height,
            format: format_name(format),
            taken_at: input.taken_at,
            steam_screenshot_id: input.steam_screenshot_id,
            steam_description: input.steam_description,
            source: input.source.as_str(),
            file_hash: &file_hash,
            exif_data: exif_data.as_deref(),
        },
    )
    .await;

    let screenshot_id = match insert_result {
        Ok(id) => id,
        Err(e) if screenshots::is_unique_violation(&e) => {
            library.cleanup(&[&original_path]).await;
            return Ok(Outcome::Skipped {
                reason: SkipReason::DuplicateHashRaced,
            });
        }
        Err(e) => {
            library.cleanup(&[&original_path]).await;
            return Err(e.into());
        }
    };

    let (sm_path, md_path) = match library
        .write_thumbnails(
            input.game_folder_name,
            screenshot_id,
            &decoded,
            thumbnail_quality,
        )
        .await
    {
        Ok(paths) => paths,
        Err(e) => {
            library.cleanup(&[&original_path]).await;
            delete_row_best_effort(pool, screenshot_id).await;
            return Err(e.into());
        }
    };

    if let Err(e) = sqlx::query(
        "UPDATE screenshots SET thumb_sm_path = ?2, thumb_md_path = ?3 WHERE id = ?1",
    )
    .bind(screenshot_id)
    .bind(path_str(&sm_path))
    .bind(path_str(&md_path))
    .execute(pool)
    .await
    {
        library
            .cleanup(&[&original_path, &sm_path, &md_path])
            .await;
        delete_row_best_effort(pool, screenshot_id).await;
        return Err(e.into());
    }

    Ok(Outcome::Completed { screenshot_id })
}

async fn delete_row_best_effort(pool: &SqlitePool, screenshot_id: i64) {
    if let Err(e) = sqlx::query("DELETE FROM screenshots WHERE id = ?1")
        .bind(screenshot_id)
        .execute(pool)
        .await
    {
        eprintln!(
            "[ingest] CRITICAL: failed to roll back screenshot row {}: {}",
            screenshot_id, e
        );
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

fn format_name(format: image::ImageFormat) -> &'static str {
    match format {
        image::ImageFormat::Jpeg => "jpeg",
        image::ImageFormat::Png => "png",
        image::ImageFormat::WebP => "webp",
        image::ImageFormat::Bmp => "bmp",
        image::ImageFormat::Tiff => "tiff",
        _ => "unknown",
    }
}

fn path_str(path: &std::path::Path) -> &str {
    path.to_str().unwrap_or_default()
}

/// Extract the raw EXIF (APP1) segment from a JPEG byte stream, if present,
/// preserved verbatim rather than parsed (spec §4.3 step 4). Returns `None`
/// for non-JPEG formats or JPEGs without an EXIF segment.
fn extract_exif_segment(data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < 4 || data[0..2] != [0xFF, 0xD8] {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            break;
        }
        let marker = data[pos + 1];
        if marker == 0xD8 || marker == 0xD9 {
            break;
        }
        let seg_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if marker == 0xE1 && pos + 4 + 6 <= data.len() && &data[pos + 4..pos + 9] == b"Exif\0" {
            let end = (pos + 2 + seg_len).min(data.len());
            return Some(data[pos + 4..end].to_vec());
        }
        pos += 2 + seg_len;
    }
    None
}
