use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use image::ImageFormat;
use sha2::{Digest, Sha256};

use super::{StorageError, validate_key};

pub const MAX_IMAGE_SIZE: usize = 50 * 1024 * 1024;
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Transient per-survey image storage. Blobs are appended under (survey id, filename),
/// enumerated by survey, and deleted together.
#[async_trait]
pub trait AccumulationStore: Send + Sync {
    /// Creates an empty accumulation state. Idempotent.
    async fn open(&self, survey_id: &str) -> Result<(), StorageError>;
    async fn append(&self, survey_id: &str, filename: &str, bytes: &[u8])
    -> Result<(), StorageError>;
    async fn exists(&self, survey_id: &str) -> Result<bool, StorageError>;
    /// Image filenames accumulated for the survey, in no particular order.
    async fn list(&self, survey_id: &str) -> Result<Vec<String>, StorageError>;
    async fn read(&self, survey_id: &str, filename: &str) -> Result<Vec<u8>, StorageError>;
    async fn delete(&self, survey_id: &str) -> Result<(), StorageError>;
    /// Surveys whose accumulation state has not changed for at least `max_age`.
    async fn stale_surveys(&self, max_age: Duration) -> Result<Vec<String>, StorageError>;
}

pub fn calculate_image_hash(image_data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image_data);
    hex::encode(hasher.finalize())
}

pub fn has_image_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Checks size and content sniffing. Returns the detected format.
pub fn validate_image(image_data: &[u8]) -> Result<ImageFormat, StorageError> {
    if image_data.len() > MAX_IMAGE_SIZE {
        return Err(StorageError::FileTooLarge);
    }
    match image::guess_format(image_data) {
        Ok(format @ (ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP)) => Ok(format),
        _ => Err(StorageError::InvalidFormat),
    }
}

/// Name for an upload that arrived without one: content hash plus detected extension.
pub fn generated_filename(image_data: &[u8], format: ImageFormat) -> String {
    let extension = format.extensions_str().first().copied().unwrap_or("jpg");
    format!("{}.{}", calculate_image_hash(image_data), extension)
}

/// Filesystem store: one directory per survey under `root`.
#[derive(Clone)]
pub struct LocalAccumulationStore {
    root: PathBuf,
}

impl LocalAccumulationStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn survey_dir(&self, survey_id: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(validate_key("survey id", survey_id)?))
    }
}

#[async_trait]
impl AccumulationStore for LocalAccumulationStore {
    async fn open(&self, survey_id: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(self.survey_dir(survey_id)?).await?;
        Ok(())
    }

    async fn append(
        &self,
        survey_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        let dir = self.survey_dir(survey_id)?;
        let filename = validate_key("filename", filename)?;
        if !has_image_extension(filename) {
            return Err(StorageError::InvalidFormat);
        }
        validate_image(bytes)?;

        tokio::fs::create_dir_all(&dir).await?;
        let partial = dir.join(format!("{filename}.part"));
        tokio::fs::write(&partial, bytes).await?;
        tokio::fs::rename(&partial, dir.join(filename)).await?;
        log::debug!("Stored {} ({} bytes) for survey {}", filename, bytes.len(), survey_id);
        Ok(())
    }

    async fn exists(&self, survey_id: &str) -> Result<bool, StorageError> {
        match tokio::fs::metadata(self.survey_dir(survey_id)?).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, survey_id: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.survey_dir(survey_id)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(format!("survey {survey_id}")));
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if has_image_extension(name) {
                    files.push(name.to_string());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    async fn read(&self, survey_id: &str, filename: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.survey_dir(survey_id)?.join(validate_key("filename", filename)?);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(format!("{survey_id}/{filename}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, survey_id: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_dir_all(self.survey_dir(survey_id)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn stale_surveys(&self, max_age: Duration) -> Result<Vec<String>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut stale = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_dir() {
                continue;
            }
            let age = meta.modified().ok().and_then(|m| m.elapsed().ok());
            if let (Some(age), Some(name)) = (age, entry.file_name().to_str()) {
                if age >= max_age {
                    stale.push(name.to_string());
                }
            }
        }
        Ok(stale)
    }
}
