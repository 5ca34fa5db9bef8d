use std::path::{Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use tracing::info;

use crate::models::{ImageMetadata, PixelDimensions};

/// URL prefix the static file service is mounted under.
pub const PUBLIC_PREFIX: &str = "/imagesGen";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to decode image {path}: {source}")]
    Decode { path: PathBuf, source: image::ImageError },
    #[error("metadata task failed: {0}")]
    Join(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub file_name: String,
    pub path: PathBuf,
    /// Path under the static route, e.g. `/imagesGen/output_0_1734962364802.png`.
    pub route: String,
}

/// Flat directory of generated images, served read-only at [`PUBLIC_PREFIX`].
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
    public_base_url: String,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self { dir: dir.into(), public_base_url: public_base_url.into().trim_end_matches('/').to_string() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Absolute URL an external service can fetch the image from.
    pub fn public_url(&self, stored: &StoredImage) -> String {
        format!("{}{}", self.public_base_url, stored.route)
    }

    /// Writes `data` under `file_name`, creating the directory first. Existing files are overwritten.
    pub async fn save(&self, file_name: &str, data: &Bytes) -> Result<StoredImage, StorageError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StorageError::Write { path: self.dir.clone(), source })?;
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, data)
            .await
            .map_err(|source| StorageError::Write { path: path.clone(), source })?;
        info!("💾 Image saved at {} ({} bytes)", path.display(), data.len());
        Ok(StoredImage { file_name: file_name.to_string(), route: format!("{PUBLIC_PREFIX}/{file_name}"), path })
    }

    /// Size and pixel dimensions of a stored file, read back from disk.
    pub async fn metadata(&self, stored: &StoredImage) -> Result<ImageMetadata, StorageError> {
        let path = stored.path.clone();
        let size = tokio::fs::metadata(&path)
            .await
            .map_err(|source| StorageError::Read { path: path.clone(), source })?
            .len();

        let (width, height) = tokio::task::spawn_blocking(move || {
            image::ImageReader::open(&path)
                .map_err(|source| StorageError::Read { path: path.clone(), source })?
                .with_guessed_format()
                .map_err(|source| StorageError::Read { path: path.clone(), source })?
                .into_dimensions()
                .map_err(|source| StorageError::Decode { path, source })
        })
        .await
        .map_err(|e| StorageError::Join(e.to_string()))??;

        Ok(ImageMetadata { file_size_kb: format_kb(size), dimensions: PixelDimensions { width, height } })
    }
}

/// Kibibytes with two decimals, e.g. `1536` bytes -> `"1.50"`.
pub fn format_kb(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / 1024.0)
}

/// Millisecond timestamp used in generated filenames.
pub fn timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Accepts identifiers that are safe to embed in a filename or URL path segment.
pub fn is_safe_segment(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 128
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32) -> Bytes {
    let mut buf = std::io::Cursor::new(Vec::new());
    image::RgbImage::new(width, height)
        .write_to(&mut buf, image::ImageFormat::Png)
        .expect("encode png");
    Bytes::from(buf.into_inner())
}
