use std::time::Duration;

use rumqttc::{AsyncClient, QoS};

use super::SinkError;
use crate::alert::Command;

/// Publishes actuator commands as JSON on the device command topic.
pub struct MqttCommandPublisher {
    client: AsyncClient,
    topic: String,
    timeout: Duration,
}

impl MqttCommandPublisher {
    pub fn new(client: AsyncClient, topic: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            topic: topic.into(),
            timeout,
        }
    }

    /// Queue `command` for delivery at QoS 1.
    ///
    /// Gives up after the configured timeout if the client's request
    /// queue stays full (e.g. while the broker is unreachable).
    pub async fn publish(&self, command: &Command) -> Result<(), SinkError> {
        let payload = serde_json::to_vec(command)?;
        tokio::time::timeout(
            self.timeout,
            self.client
                .publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload),
        )
        .await
        .map_err(|_| SinkError::Timeout(self.timeout))??;
        Ok(())
    }
}
