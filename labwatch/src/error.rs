//! Crate-level error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::event_log::EventLogError;
use crate::sink::SinkError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("side effect failed: {0}")]
    Sink(#[from] SinkError),

    #[error("event log error: {0}")]
    EventLog(#[from] EventLogError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
