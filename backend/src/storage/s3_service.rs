use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;

use super::artifact::{ArtifactStore, report_file_name};
use super::{StorageError, validate_key};

/// Report storage in an S3 bucket, keyed `reports/AgriSense_Report_<survey>.pdf`.
#[derive(Clone)]
pub struct S3Service {
    client: Client,
    bucket_name: String,
}

impl S3Service {
    pub fn new(client: Client, bucket_name: String) -> Self {
        Self {
            client,
            bucket_name,
        }
    }

    pub fn generate_s3_key(survey_id: &str) -> Result<String, StorageError> {
        let survey_id = validate_key("survey id", survey_id)?;
        Ok(format!("reports/{}", report_file_name(survey_id)))
    }
}

#[async_trait]
impl ArtifactStore for S3Service {
    async fn put(&self, survey_id: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let s3_key = Self::generate_s3_key(survey_id)?;
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&s3_key)
            .body(ByteStream::from(bytes))
            .content_type("application/pdf")
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;
        log::info!("Report uploaded to s3://{}/{}", self.bucket_name, s3_key);
        Ok(())
    }

    async fn get(&self, survey_id: &str) -> Result<Vec<u8>, StorageError> {
        let s3_key = Self::generate_s3_key(survey_id)?;
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(&s3_key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service_error) if service_error.is_no_such_key() => {
                    StorageError::NotFound(s3_key.clone())
                }
                _ => StorageError::S3(e.to_string()),
            })?;

        let body = result
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn exists(&self, survey_id: &str) -> Result<bool, StorageError> {
        let s3_key = Self::generate_s3_key(survey_id)?;
        match self
            .client
            .head_object()
            .bucket(&self.bucket_name)
            .key(&s3_key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => match e.as_service_error() {
                Some(service_error) if service_error.is_not_found() => Ok(false),
                _ => Err(StorageError::S3(e.to_string())),
            },
        }
    }
}
