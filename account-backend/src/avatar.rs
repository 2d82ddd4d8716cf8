//! Profile picture storage: extension checks, thumbnailing, replacement.

use image::io::{Limits, Reader as ImageReader};
use image::{imageops::FilterType, DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::config::defaults;

/// Extensions accepted for uploaded profile pictures
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "png"];

/// Largest accepted source width or height, in pixels
pub const MAX_SOURCE_DIMENSION: u32 = 4096;
/// Decoder allocation ceiling for a single upload
const MAX_DECODE_ALLOC: u64 = 64 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    #[error("file extension is not allowed, only {}", ALLOWED_EXTENSIONS.join(","))]
    ExtensionNotAllowed,
    #[error("could not process image: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to store profile picture: {0}")]
    Io(#[from] std::io::Error),
}

/// Lowercased extension of `filename` if it is one of [`ALLOWED_EXTENSIONS`]
pub fn allowed_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())?
        .to_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// A filename that can be safely joined onto the avatar directory
pub fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.starts_with('.')
        && !filename.contains("..")
        && !filename.contains('/')
        && !filename.contains('\\')
}

/// Decode `data` with dimension and allocation limits sized for avatars
fn decode_limited(data: &[u8]) -> Result<DynamicImage, AvatarError> {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_SOURCE_DIMENSION);
    limits.max_image_height = Some(MAX_SOURCE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);

    let mut reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
    reader.limits(limits);
    Ok(reader.decode()?)
}

fn random_stem() -> String {
    let mut buf = [0u8; 8];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut buf);
    hex::encode(buf)
}

/// Directory of stored profile pictures
pub struct AvatarStore {
    dir: PathBuf,
    thumbnail_size: u32,
}

impl AvatarStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            thumbnail_size: defaults::THUMBNAIL_SIZE,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory and a neutral placeholder `default.png` if missing
    pub fn ensure_default(&self) -> Result<(), AvatarError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(defaults::PROFILE_IMAGE);
        if !path.exists() {
            let placeholder =
                RgbImage::from_pixel(self.thumbnail_size, self.thumbnail_size, Rgb([200, 200, 200]));
            placeholder.save_with_format(&path, ImageFormat::Png)?;
            log::info!("[AVATAR] Wrote placeholder {}", path.display());
        }
        Ok(())
    }

    /// Store an uploaded picture and return its new filename.
    ///
    /// The image is decoded first, shrunk to fit the thumbnail square (never
    /// enlarged), and written under a random name. The caller removes the
    /// picture being replaced once the account points at the new one.
    pub fn save_picture(&self, data: &[u8], original_filename: &str) -> Result<String, AvatarError> {
        let ext = allowed_extension(original_filename).ok_or(AvatarError::ExtensionNotAllowed)?;

        let mut img = decode_limited(data)?;
        if img.width() > self.thumbnail_size || img.height() > self.thumbnail_size {
            img = img.resize(self.thumbnail_size, self.thumbnail_size, FilterType::Lanczos3);
        }

        let (format, img) = if ext == "png" {
            (ImageFormat::Png, img)
        } else {
            // JPEG has no alpha channel
            (ImageFormat::Jpeg, DynamicImage::ImageRgb8(img.to_rgb8()))
        };

        std::fs::create_dir_all(&self.dir)?;
        let filename = format!("{}.{}", random_stem(), ext);
        img.save_with_format(self.dir.join(&filename), format)?;
        log::debug!("[AVATAR] Stored {}", filename);

        Ok(filename)
    }

    /// Delete a stored picture. The shared default image is never removed.
    pub fn remove_picture(&self, filename: &str) {
        if filename == defaults::PROFILE_IMAGE || !is_safe_filename(filename) {
            return;
        }
        let path = self.dir.join(filename);
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("[AVATAR] Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 120, 200])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_allowed_extension() {
        assert_eq!(allowed_extension("me.PNG").as_deref(), Some("png"));
        assert_eq!(allowed_extension("photo.jpg").as_deref(), Some("jpg"));
        assert_eq!(allowed_extension("anim.gif"), None);
        assert_eq!(allowed_extension("photo.jpeg"), None);
        assert_eq!(allowed_extension("noext"), None);
    }

    #[test]
    fn test_safe_filename() {
        assert!(is_safe_filename("0123456789abcdef.png"));
        assert!(!is_safe_filename("../secret.png"));
        assert!(!is_safe_filename(".hidden.png"));
        assert!(!is_safe_filename("a/b.png"));
        assert!(!is_safe_filename(""));
    }

    #[test]
    fn test_save_picture_thumbnails_large_images() {
        let dir = tempdir().unwrap();
        let store = AvatarStore::new(dir.path());

        let name = store
            .save_picture(&encode(300, 200, ImageFormat::Png), "holiday.png")
            .unwrap();

        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), 16 + 4);
        let saved = image::open(dir.path().join(&name)).unwrap();
        assert_eq!(saved.width(), 125);
        assert!(saved.height() <= 125);
    }

    #[test]
    fn test_save_picture_keeps_small_images() {
        let dir = tempdir().unwrap();
        let store = AvatarStore::new(dir.path());

        let name = store
            .save_picture(&encode(40, 30, ImageFormat::Jpeg), "tiny.JPG")
            .unwrap();

        assert!(name.ends_with(".jpg"));
        let saved = image::open(dir.path().join(&name)).unwrap();
        assert_eq!((saved.width(), saved.height()), (40, 30));
    }

    #[test]
    fn test_remove_picture_spares_default() {
        let dir = tempdir().unwrap();
        let store = AvatarStore::new(dir.path());
        store.ensure_default().unwrap();

        let first = store
            .save_picture(&encode(10, 10, ImageFormat::Png), "a.png")
            .unwrap();
        let second = store
            .save_picture(&encode(10, 10, ImageFormat::Png), "b.png")
            .unwrap();
        assert_ne!(first, second);

        store.remove_picture(&first);
        store.remove_picture("default.png");
        store.remove_picture("../default.png");
        store.remove_picture("missing.png");

        assert!(!dir.path().join(&first).exists());
        assert!(dir.path().join(&second).exists());
        assert!(dir.path().join("default.png").exists());
    }

    #[test]
    fn test_rejects_bad_extension_and_bad_data() {
        let dir = tempdir().unwrap();
        let store = AvatarStore::new(dir.path());

        let err = store.save_picture(b"GIF89a", "anim.gif").unwrap_err();
        assert!(matches!(err, AvatarError::ExtensionNotAllowed));
        assert_eq!(err.to_string(), "file extension is not allowed, only jpg,png");

        let err = store.save_picture(b"not an image", "fake.png").unwrap_err();
        assert!(matches!(err, AvatarError::Image(_)));
    }

    #[test]
    fn test_rejects_oversized_source() {
        let dir = tempdir().unwrap();
        let store = AvatarStore::new(dir.path());

        // Tiny once compressed, but wider than any avatar source should be
        let wide = encode(MAX_SOURCE_DIMENSION + 1, 1, ImageFormat::Png);
        let err = store.save_picture(&wide, "wide.png").unwrap_err();
        assert!(matches!(err, AvatarError::Image(image::ImageError::Limits(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_ensure_default_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = AvatarStore::new(dir.path().join("pics"));
        store.ensure_default().unwrap();
        store.ensure_default().unwrap();

        let img = image::open(dir.path().join("pics").join("default.png")).unwrap();
        assert_eq!(img.width(), 125);
    }
}
