//! Telemetry messages and their decoding from broker topics.
//!
//! The device publishes three kinds of message under a common namespace:
//!
//! | Topic | Payload | Decoded as |
//! |-------|---------|------------|
//! | `<ns>/sensor/state` | `{"temp_c": 24.1, "gas": 900, ...}` | [`Sample`] |
//! | `<ns>/sys/online` | `{"online": true}` | [`ControlMessage::DeviceOnline`] |
//! | `<ns>/device/state` | `{"light": "on", "fan": "off"}` | [`ControlMessage::DeviceState`] |
//!
//! Commands go the other way on `<ns>/device/cmd`.

pub mod mqtt;

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON on {topic}: {source}")]
    Json {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("payload on {topic} is not a JSON object")]
    NotAnObject { topic: String },

    #[error("field `{field}` on {topic}: {reason}")]
    InvalidField {
        topic: String,
        field: String,
        reason: String,
    },
}

/// One sensor reading: signal key to numeric value.
///
/// Fields that were present but not numeric are remembered separately so
/// the evaluator can tell a malformed value from an absent one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    values: BTreeMap<String, f64>,
    rejected: BTreeSet<String>,
}

/// What a [`Sample`] says about one key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Value(f64),
    NonNumeric,
    Absent,
}

impl Sample {
    /// Build a sample from a decoded JSON object.
    pub fn from_object(object: &serde_json::Map<String, Value>) -> Self {
        let mut sample = Sample::default();
        for (key, value) in object {
            match value.as_f64().filter(|v| v.is_finite()) {
                Some(v) => {
                    sample.values.insert(key.clone(), v);
                }
                None => {
                    sample.rejected.insert(key.clone());
                }
            }
        }
        sample
    }

    pub fn reading(&self, key: &str) -> Reading {
        if let Some(v) = self.values.get(key) {
            Reading::Value(*v)
        } else if self.rejected.contains(key) {
            Reading::NonNumeric
        } else {
            Reading::Absent
        }
    }

    /// Numeric fields only.
    pub fn values(&self) -> &BTreeMap<String, f64> {
        &self.values
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Sample {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Sample {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            rejected: BTreeSet::new(),
        }
    }
}

/// Messages from the control channel. Never debounced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    DeviceOnline(bool),

    /// Actuator name to reported state (`"on"` / `"off"`).
    DeviceState(BTreeMap<String, String>),
}

/// Anything the evaluator consumes, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Sample(Sample),
    Control(ControlMessage),
}

/// Topic layout under one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub sensor_state: String,
    pub online: String,
    pub device_state: String,
    pub command: String,
    /// Wildcard covering every topic above.
    pub all: String,
}

impl Topics {
    pub fn new(namespace: &str) -> Self {
        let ns = namespace.trim_end_matches('/');
        Self {
            sensor_state: format!("{ns}/sensor/state"),
            online: format!("{ns}/sys/online"),
            device_state: format!("{ns}/device/state"),
            command: format!("{ns}/device/cmd"),
            all: format!("{ns}/#"),
        }
    }

    /// Decode a message. Returns `Ok(None)` for topics the evaluator does
    /// not consume.
    pub fn decode(&self, topic: &str, payload: &[u8]) -> Result<Option<Inbound>, DecodeError> {
        if topic != self.sensor_state && topic != self.online && topic != self.device_state {
            return Ok(None);
        }

        let value: Value = serde_json::from_slice(payload).map_err(|source| DecodeError::Json {
            topic: topic.to_string(),
            source,
        })?;
        let Value::Object(object) = value else {
            return Err(DecodeError::NotAnObject {
                topic: topic.to_string(),
            });
        };

        let inbound = if topic == self.sensor_state {
            Inbound::Sample(Sample::from_object(&object))
        } else if topic == self.online {
            let online = match object.get("online") {
                Some(Value::Bool(b)) => *b,
                other => {
                    return Err(DecodeError::InvalidField {
                        topic: topic.to_string(),
                        field: "online".into(),
                        reason: match other {
                            None => "missing".into(),
                            Some(v) => format!("expected boolean, got {v}"),
                        },
                    });
                }
            };
            Inbound::Control(ControlMessage::DeviceOnline(online))
        } else {
            let states = object
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect();
            Inbound::Control(ControlMessage::DeviceState(states))
        };

        Ok(Some(inbound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics() -> Topics {
        Topics::new("lstiot/lab/room1")
    }

    #[test]
    fn topics_follow_namespace() {
        let t = Topics::new("lstiot/lab/room1/");
        assert_eq!(t.sensor_state, "lstiot/lab/room1/sensor/state");
        assert_eq!(t.command, "lstiot/lab/room1/device/cmd");
        assert_eq!(t.all, "lstiot/lab/room1/#");
    }

    #[test]
    fn decodes_sensor_sample() {
        let payload = br#"{"temp_c": 36.5, "gas": 1200, "lux": "dark", "hum_pct": 40}"#;
        let Some(Inbound::Sample(sample)) = topics()
            .decode("lstiot/lab/room1/sensor/state", payload)
            .unwrap()
        else {
            panic!("expected a sample");
        };

        assert_eq!(sample.reading("temp_c"), Reading::Value(36.5));
        assert_eq!(sample.reading("gas"), Reading::Value(1200.0));
        assert_eq!(sample.reading("lux"), Reading::NonNumeric);
        assert_eq!(sample.reading("pressure"), Reading::Absent);
    }

    #[test]
    fn null_field_is_non_numeric() {
        let payload = br#"{"temp_c": null}"#;
        let Some(Inbound::Sample(sample)) = topics()
            .decode("lstiot/lab/room1/sensor/state", payload)
            .unwrap()
        else {
            panic!("expected a sample");
        };
        assert_eq!(sample.reading("temp_c"), Reading::NonNumeric);
    }

    #[test]
    fn decodes_online_status() {
        let msg = topics()
            .decode("lstiot/lab/room1/sys/online", br#"{"online": false}"#)
            .unwrap();
        assert_eq!(
            msg,
            Some(Inbound::Control(ControlMessage::DeviceOnline(false)))
        );
    }

    #[test]
    fn non_boolean_online_is_rejected() {
        let err = topics()
            .decode("lstiot/lab/room1/sys/online", br#"{"online": "yes"}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidField { ref field, .. } if field == "online"));
    }

    #[test]
    fn device_state_keeps_string_fields() {
        let msg = topics()
            .decode(
                "lstiot/lab/room1/device/state",
                br#"{"light": "on", "fan": "off", "uptime": 12}"#,
            )
            .unwrap();
        let expected = BTreeMap::from([
            ("light".to_string(), "on".to_string()),
            ("fan".to_string(), "off".to_string()),
        ]);
        assert_eq!(
            msg,
            Some(Inbound::Control(ControlMessage::DeviceState(expected)))
        );
    }

    #[test]
    fn other_topics_are_ignored() {
        let msg = topics()
            .decode("lstiot/lab/room1/device/cmd", b"not even json")
            .unwrap();
        assert_eq!(msg, None);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let err = topics()
            .decode("lstiot/lab/room1/sensor/state", b"{temp")
            .unwrap_err();
        assert!(matches!(err, DecodeError::Json { .. }));
    }

    #[test]
    fn array_payload_is_an_error() {
        let err = topics()
            .decode("lstiot/lab/room1/sensor/state", b"[1, 2]")
            .unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject { .. }));
    }
}
