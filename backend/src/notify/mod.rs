pub mod mqtt;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("MQTT client error: {0}")]
    Client(String),
    #[error("MQTT connection error: {0}")]
    Connection(String),
    #[error("Timed out waiting for broker acknowledgement")]
    Timeout,
}

/// Best-effort announcement that an artifact is ready. Callers log failures and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, topic: &str, message: &str) -> Result<(), NotifyError>;
}

/// Used when no broker is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, topic: &str, message: &str) -> Result<(), NotifyError> {
        log::info!("No MQTT broker configured; would publish '{}' to topic '{}'", message, topic);
        Ok(())
    }
}
