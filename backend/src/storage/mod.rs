pub mod accumulation;
pub mod artifact;
pub mod s3_service;

const MAX_KEY_LEN: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("S3 error: {0}")]
    S3(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid {kind}: {value:?}")]
    InvalidKey { kind: &'static str, value: String },
    #[error("Invalid file format")]
    InvalidFormat,
    #[error("File too large")]
    FileTooLarge,
}

/// Survey ids and upload filenames become path components, so only a conservative
/// character set is accepted.
pub fn validate_key<'a>(kind: &'static str, value: &'a str) -> Result<&'a str, StorageError> {
    let valid = !value.is_empty()
        && value.len() <= MAX_KEY_LEN
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(value)
    } else {
        Err(StorageError::InvalidKey {
            kind,
            value: value.to_string(),
        })
    }
}
