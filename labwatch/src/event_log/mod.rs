//! Write-only audit trail of fired alerts and device events.

mod jsonl;
mod recent;

pub(crate) use jsonl::JsonLinesFile;
pub use jsonl::JsonLinesLog;
pub use recent::RecentEvents;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct EventRecord {
    /// Position in this process's log, starting at 1.
    pub seq: u64,
    pub event_type: String,
    #[schema(value_type = Object)]
    pub details: Map<String, Value>,
    /// RFC 3339 timestamp taken when the record was written.
    pub recorded_at: String,
}

impl EventRecord {
    pub fn new(seq: u64, event_type: &str, details: Map<String, Value>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            seq,
            event_type: event_type.to_string(),
            details,
            recorded_at: now.format(&Rfc3339).unwrap_or_else(|_| now.to_string()),
        }
    }
}

/// Destination for audit records.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(&self, event_type: &str, details: &Map<String, Value>)
    -> Result<(), EventLogError>;

    /// Name used in logs when an append fails.
    fn name(&self) -> &str;
}
