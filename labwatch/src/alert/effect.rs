//! Side effects requested by the evaluator.

use serde_json::{Map, Value};

use super::signal::Command;

/// One side effect to run after a decision.
///
/// The evaluator only describes what should happen; the dispatcher
/// performs it.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Write an audit record.
    Append {
        event_type: String,
        details: Map<String, Value>,
    },

    /// Send a notification.
    Notify { title: String, body: String },

    /// Publish an actuator command to the device.
    PublishCommand(Command),
}

impl Effect {
    pub fn append(event_type: impl Into<String>, details: Map<String, Value>) -> Self {
        Effect::Append {
            event_type: event_type.into(),
            details,
        }
    }

    pub fn notify(title: impl Into<String>, body: impl Into<String>) -> Self {
        Effect::Notify {
            title: title.into(),
            body: body.into(),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::Append { .. } => "append",
            Effect::Notify { .. } => "notify",
            Effect::PublishCommand(_) => "publish_command",
        }
    }
}
