//! Sensor telemetry alerting service.
//!
//! Readings arrive from an MQTT broker, pass through one debouncer per
//! monitored signal, and sustained threshold breaches turn into
//! notifications, actuator commands and audit records.

pub mod alert;
pub mod api;
pub mod api_client;
pub mod config;
pub mod daemon;
pub mod error;
pub mod event_log;
pub mod history;
pub mod sink;
pub mod telemetry;
pub mod tracing;
