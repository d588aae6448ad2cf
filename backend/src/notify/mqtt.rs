use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS, Transport};
use uuid::Uuid;

use super::{NotifyError, Notifier};
use crate::config::MqttConfig;

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const ACK_TIMEOUT: Duration = Duration::from_secs(15);

/// Connects, publishes once, and disconnects for every notification.
pub struct MqttNotifier {
    config: MqttConfig,
}

impl MqttNotifier {
    pub fn new(config: MqttConfig) -> Self {
        Self { config }
    }

    fn options(&self) -> MqttOptions {
        let client_id = format!("agrisense-{}", Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id, &self.config.hostname, self.config.port);
        options.set_keep_alive(KEEP_ALIVE);
        if let Some(username) = &self.config.username {
            options.set_credentials(
                username.clone(),
                self.config.password.clone().unwrap_or_default(),
            );
        }
        if self.config.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }
}

#[async_trait]
impl Notifier for MqttNotifier {
    async fn publish(&self, topic: &str, message: &str) -> Result<(), NotifyError> {
        let (client, mut eventloop) = AsyncClient::new(self.options(), 10);
        client
            .publish(topic, QoS::AtLeastOnce, false, message.as_bytes().to_vec())
            .await
            .map_err(|e| NotifyError::Client(e.to_string()))?;

        let acknowledged = tokio::time::timeout(ACK_TIMEOUT, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::PubAck(_))) => return Ok(()),
                    Ok(_) => continue,
                    Err(e) => return Err(NotifyError::Connection(e.to_string())),
                }
            }
        })
        .await
        .map_err(|_| NotifyError::Timeout)?;
        acknowledged?;

        client
            .disconnect()
            .await
            .map_err(|e| NotifyError::Client(e.to_string()))?;
        // Flush the DISCONNECT packet; the broker closing the socket ends the loop.
        let _ = tokio::time::timeout(ACK_TIMEOUT, async {
            while let Ok(event) = eventloop.poll().await {
                if matches!(event, Event::Outgoing(Outgoing::Disconnect)) {
                    break;
                }
            }
        })
        .await;

        log::info!("Published '{}' to topic '{}'", message, topic);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn unreachable_broker_is_an_error_not_a_panic() {
        let notifier = MqttNotifier::new(MqttConfig {
            hostname: "127.0.0.1".into(),
            port: 1,
            username: None,
            password: None,
            use_tls: false,
        });
        assert!(notifier.publish("agrisense/test", "s1").await.is_err());
    }
}
