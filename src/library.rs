//! Content-addressed file layout on disk and thumbnail generation (spec §6.3):
//!
//! ```text
//! {library_dir}/{game.folder_name}/{filename}.{ext}
//! {library_dir}/{game.folder_name}/thumbs/{id}_sm.jpg
//! {library_dir}/{game.folder_name}/thumbs/{id}_md.jpg
//! ```
//!
//! All writes go through a temp file plus atomic rename. No lock files.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

/// Short edges of the two thumbnail sizes the ingest worker generates.
pub const THUMB_SM_EDGE: u32 = 400;
pub const THUMB_MD_EDGE: u32 = 800;

pub struct Library {
    root: PathBuf,
}

impl Library {
    pub fn new(root: PathBuf) -> Self {
        Library { root }
    }

    pub fn game_dir(&self, folder_name: &str) -> PathBuf {
        self.root.join(folder_name)
    }

    pub fn thumbs_dir(&self, folder_name: &str) -> PathBuf {
        self.game_dir(folder_name).join("thumbs")
    }

    /// Sanitize a claimed filename (strip path separators and control
    /// characters) and, if it already exists in the game's directory,
    /// suffix it with the first 8 hex chars of `file_hash` (spec §9,
    /// "Filename collision handling").
    pub async fn unique_filename(
        &self,
        folder_name: &str,
        claimed_filename: &str,
        file_hash: &str,
    ) -> String {
        let sanitized = sanitize_filename(claimed_filename);
        let dir = self.game_dir(folder_name);
        let candidate_path = dir.join(&sanitized);
        if !tokio::fs::try_exists(&candidate_path).await.unwrap_or(false) {
            return sanitized;
        }

        let (stem, ext) = split_extension(&sanitized);
        let suffix = &file_hash[..file_hash.len().min(8)];
        if ext.is_empty() {
            format!("{}-{}", stem, suffix)
        } else {
            format!("{}-{}.{}", stem, suffix, ext)
        }
    }

    /// Write `data` to `{game_dir}/{filename}` via temp-file + atomic rename.
    pub async fn write_original(
        &self,
        folder_name: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<PathBuf, std::io::Error> {
        let dir = self.game_dir(folder_name);
        tokio::fs::create_dir_all(&dir).await?;
        let dest = dir.join(filename);
        atomic_write(&dest, data).await?;
        Ok(dest)
    }

    /// Generate both thumbnails for `image` and write them under
    /// `thumbs/{id}_sm.jpg` / `thumbs/{id}_md.jpg`, returning their paths.
    pub async fn write_thumbnails(
        &self,
        folder_name: &str,
        screenshot_id: i64,
        image: &DynamicImage,
        quality: u8,
    ) -> Result<(PathBuf, PathBuf), std::io::Error> {
        let dir = self.thumbs_dir(folder_name);
        tokio::fs::create_dir_all(&dir).await?;

        let sm_path = dir.join(format!("{}_sm.jpg", screenshot_id));
        let md_path = dir.join(format!("{}_md.jpg", screenshot_id));

        let sm_bytes = encode_thumbnail(image, THUMB_SM_EDGE, quality);
        let md_bytes = encode_thumbnail(image, THUMB_MD_EDGE, quality);

        atomic_write(&sm_path, &sm_bytes).await?;
        atomic_write(&md_path, &md_bytes).await?;

        Ok((sm_path, md_path))
    }

    /// Remove any of the given paths that exist, best-effort. Used by the
    /// ingest worker to clean up after a failure or a raced dedup insert.
    pub async fn cleanup(&self, paths: &[&Path]) {
        for path in paths {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    eprintln!("[library] failed to clean up {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// Resize `image` so its shorter edge is `short_edge` pixels and encode as
/// JPEG at `quality`.
fn encode_thumbnail(image: &DynamicImage, short_edge: u32, quality: u8) -> Vec<u8> {
    let (w, h) = (image.width(), image.height());
    let (target_w, target_h) = if w < h {
        (short_edge, (h as u64 * short_edge as u64 / w as u64) as u32)
    } else {
        ((w as u64 * short_edge as u64 / h as u64) as u32, short_edge)
    };

    let resized = image.resize(target_w, target_h, FilterType::Lanczos3);
    let mut out = std::io::Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    resized
        .write_with_encoder(encoder)
        .expect("in-memory JPEG encode cannot fail");
    out.into_inner()
}

async fn atomic_write(dest: &Path, data: &[u8]) -> Result<(), std::io::Error> {
    let tmp = dest.with_extension(format!(
        "{}.tmp",
        dest.extension().and_then(|e| e.to_str()).unwrap_or("bin")
    ));
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, dest).await?;
    Ok(())
}

fn sanitize_filename(claimed: &str) -> String {
    let base = claimed.rsplit(['/', '\\']).next().unwrap_or(claimed);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "screenshot".to_string()
    } else {
        cleaned
    }
}

fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (filename, ""),
    }
}

/// Guess the registered `image::ImageFormat` from magic bytes, restricted to
/// the formats the ingest worker accepts (spec §4.3 step 1).
pub fn accepted_format(data: &[u8]) -> Option<ImageFormat> {
    let format = image::guess_format(data).ok()?;
    match format {
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP | ImageFormat::Bmp
        | ImageFormat::Tiff => Some(format),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_filename_strips_path_and_odd_chars() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("my screenshot!.png"), "my_screenshot_.png");
    }

    #[test]
    fn split_extension_handles_dotfiles_and_no_extension() {
        assert_eq!(split_extension("photo.png"), ("photo", "png"));
        assert_eq!(split_extension("noext"), ("noext", ""));
    }

    #[tokio::test]
    async fn unique_filename_suffixes_on_collision() {
        let tmp = tempfile::tempdir().unwrap();
        let lib = Library::new(tmp.path().to_path_buf());
        tokio::fs::create_dir_all(lib.game_dir("halflife2"))
            .await
            .unwrap();
        tokio::fs::write(lib.game_dir("halflife2").join("shot.png"), b"x")
            .await
            .unwrap();

        let name = lib
            .unique_filename("halflife2", "shot.png", "deadbeefcafebabe")
            .await;
        assert_eq!(name, "shot-deadbeef.png");
    }

    #[test]
    fn accepted_format_rejects_unrecognized_bytes() {
        assert!(accepted_format(b"not an image").is_none());
    }
}
