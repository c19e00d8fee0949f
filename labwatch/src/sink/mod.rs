//! Outbound side effects: notifications and actuator commands.
//!
//! Every operation reports its outcome instead of panicking; callers log
//! failures and move on. Nothing here is retried.

mod dispatcher;
mod mqtt;
mod telegram;

pub use dispatcher::EffectDispatcher;
pub use mqtt::MqttCommandPublisher;
pub use telegram::{DEFAULT_API_BASE as TELEGRAM_API_BASE, TelegramConfig, TelegramNotifier};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::alert::Command;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("MQTT publish failed: {0}")]
    Publish(#[from] rumqttc::ClientError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Notification and command transport, as seen by the evaluator.
#[async_trait]
pub trait SideEffectSink: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> Result<(), SinkError>;

    async fn publish_command(&self, command: &Command) -> Result<(), SinkError>;
}

/// Production sink: Telegram for notifications, MQTT for commands.
pub struct ServiceSink {
    notifier: Option<TelegramNotifier>,
    publisher: MqttCommandPublisher,
}

impl ServiceSink {
    /// `notifier` is `None` when no bot credentials are configured;
    /// notifications then fail with [`SinkError::NotConfigured`].
    pub fn new(notifier: Option<TelegramNotifier>, publisher: MqttCommandPublisher) -> Self {
        Self {
            notifier,
            publisher,
        }
    }
}

#[async_trait]
impl SideEffectSink for ServiceSink {
    async fn notify(&self, title: &str, body: &str) -> Result<(), SinkError> {
        match &self.notifier {
            Some(notifier) => notifier.send(title, body).await,
            None => Err(SinkError::NotConfigured("Telegram bot")),
        }
    }

    async fn publish_command(&self, command: &Command) -> Result<(), SinkError> {
        self.publisher.publish(command).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;

    use super::*;

    /// Sink that records calls, optionally failing every one of them.
    #[derive(Default)]
    pub struct RecordingSink {
        pub notifications: Mutex<Vec<(String, String)>>,
        pub commands: Mutex<Vec<Command>>,
        pub fail: bool,
    }

    impl RecordingSink {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl SideEffectSink for RecordingSink {
        async fn notify(&self, title: &str, body: &str) -> Result<(), SinkError> {
            self.notifications
                .lock()
                .push((title.to_string(), body.to_string()));
            if self.fail {
                return Err(SinkError::Timeout(Duration::from_secs(10)));
            }
            Ok(())
        }

        async fn publish_command(&self, command: &Command) -> Result<(), SinkError> {
            self.commands.lock().push(command.clone());
            if self.fail {
                return Err(SinkError::NotConfigured("MQTT"));
            }
            Ok(())
        }
    }
}
