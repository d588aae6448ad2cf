pub mod advisory;
pub mod gemini;
pub mod kindwise;
pub mod model;
pub mod service;

#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("{0} API key is not configured")]
    MissingCredentials(&'static str),
    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },
    #[error("{service} returned status {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} returned a malformed payload: {message}")]
    MalformedPayload {
        service: &'static str,
        message: String,
    },
}
