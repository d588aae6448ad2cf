use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::analysis::DependencyError;
use crate::report::RenderError;
use crate::storage::StorageError;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Survey {0} is already being processed")]
    SurveyBusy(String),
    #[error(transparent)]
    Dependency(#[from] DependencyError),
    #[error("Storage error: {0}")]
    Storage(StorageError),
    #[error("Report rendering failed: {0}")]
    Render(#[from] RenderError),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidKey { .. } => ApiError::InvalidRequest(err.to_string()),
            StorageError::InvalidFormat => {
                ApiError::InvalidRequest("Uploaded file is not a supported image".into())
            }
            StorageError::FileTooLarge => ApiError::InvalidRequest("File too large".into()),
            StorageError::NotFound(what) => ApiError::NotFound(format!("Not found: {what}")),
            other => ApiError::Storage(other),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::SurveyBusy(_) => StatusCode::CONFLICT,
            ApiError::Dependency(DependencyError::MissingCredentials(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Dependency(_) => StatusCode::BAD_GATEWAY,
            ApiError::Storage(_) | ApiError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        }
        HttpResponse::build(status).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}
