//! Shared scaffolding for the end-to-end scenarios in spec.md §8: an
//! in-memory SQLite pool, a temp-dir-backed `Library`, and a `StubScraper`
//! stand-in for `steamcommunity.com`.

use std::sync::Arc;

use gamevault_import::import::engine::ImportEngine;
use gamevault_import::library::Library;
use gamevault_import::rate_limiter::RateLimiter;
use gamevault_import::scraper::stub::StubScraper;
use gamevault_import::storage;
use sqlx::SqlitePool;

/// A trivially valid, uncompressed 1x1 24-bit BMP filled with `(r, g, b)`.
/// BMP's `BI_RGB` storage has no checksums or compressed streams to get
/// wrong by hand, and distinct colors give distinct `file_hash`es — exactly
/// what the dedup-by-hash scenarios need from "different screenshots".
pub fn one_pixel_bmp(r: u8, g: u8, b: u8) -> Vec<u8> {
    const FILE_HEADER_LEN: u32 = 14;
    const DIB_HEADER_LEN: u32 = 40;
    const ROW_LEN: u32 = 4; // 3 bytes BGR + 1 padding byte, for a 1px-wide row.
    let pixel_data_offset = FILE_HEADER_LEN + DIB_HEADER_LEN;
    let file_size = pixel_data_offset + ROW_LEN;

    let mut out = Vec::with_capacity(file_size as usize);
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&file_size.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // reserved
    out.extend_from_slice(&pixel_data_offset.to_le_bytes());

    out.extend_from_slice(&DIB_HEADER_LEN.to_le_bytes());
    out.extend_from_slice(&1i32.to_le_bytes()); // width
    out.extend_from_slice(&1i32.to_le_bytes()); // height
    out.extend_from_slice(&1u16.to_le_bytes()); // planes
    out.extend_from_slice(&24u16.to_le_bytes()); // bits per pixel
    out.extend_from_slice(&0u32.to_le_bytes()); // compression = BI_RGB
    out.extend_from_slice(&ROW_LEN.to_le_bytes()); // image data size
    out.extend_from_slice(&2835i32.to_le_bytes()); // x pixels/meter
    out.extend_from_slice(&2835i32.to_le_bytes()); // y pixels/meter
    out.extend_from_slice(&0u32.to_le_bytes()); // colors used
    out.extend_from_slice(&0u32.to_le_bytes()); // important colors

    out.extend_from_slice(&[b, g, r, 0]); // one BGR pixel + row padding
    out
}

pub async fn in_memory_pool() -> SqlitePool {
    storage::connect(std::path::Path::new(":memory:"))
        .await
        .expect("open in-memory sqlite pool")
}

pub fn temp_library() -> (tempfile::TempDir, Arc<Library>) {
    let dir = tempfile::tempdir().expect("create temp library dir");
    let library = Arc::new(Library::new(dir.path().to_path_buf()));
    (dir, library)
}

/// Build an `ImportEngine` with a fast (1ms) rate limiter so tests don't pay
/// the real default interval between every simulated Steam request.
pub fn fast_engine(pool: SqlitePool, library: Arc<Library>, scraper: StubScraper) -> ImportEngine {
    ImportEngine::new(
        pool,
        library,
        Arc::new(scraper),
        Arc::new(RateLimiter::new(1)),
        85,
    )
}

pub async fn session_status(pool: &SqlitePool, session_id: i64) -> String {
    sqlx::query_scalar("SELECT status FROM import_sessions WHERE id = ?1")
        .bind(session_id)
        .fetch_one(pool)
        .await
        .expect("read session status")
}
