use std::path::PathBuf;

use async_trait::async_trait;

use super::{StorageError, validate_key};

/// Durable report storage addressed by survey id. Existence doubles as "report ready".
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Writes the finished document, replacing any earlier one for the same survey.
    async fn put(&self, survey_id: &str, bytes: Vec<u8>) -> Result<(), StorageError>;
    async fn get(&self, survey_id: &str) -> Result<Vec<u8>, StorageError>;
    async fn exists(&self, survey_id: &str) -> Result<bool, StorageError>;
}

pub fn report_file_name(survey_id: &str) -> String {
    format!("AgriSense_Report_{}.pdf", survey_id)
}

#[derive(Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn report_path(&self, survey_id: &str) -> Result<PathBuf, StorageError> {
        let survey_id = validate_key("survey id", survey_id)?;
        Ok(self.root.join(report_file_name(survey_id)))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, survey_id: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.report_path(survey_id)?;
        tokio::fs::create_dir_all(&self.root).await?;
        // Readers only ever see a complete file.
        let partial = path.with_extension("pdf.part");
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, &path).await?;
        log::info!("Report saved at: {}", path.display());
        Ok(())
    }

    async fn get(&self, survey_id: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.report_path(survey_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(report_file_name(survey_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, survey_id: &str) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.report_path(survey_id)?).await?)
    }
}
