//! API data transfer objects.
//!
//! These types define the API contract shared between the server and
//! clients.

use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

pub use crate::alert::DeviceSnapshot;
pub use crate::event_log::EventRecord;
pub use crate::history::{HistoryBucket, HistoryRange};

/// Records returned by `GET /events` when no limit is given.
pub const DEFAULT_EVENT_LIMIT: usize = 50;

/// Query string of `GET /events`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Maximum number of records, newest last.
    pub limit: Option<usize>,
}

impl EventsQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_EVENT_LIMIT)
    }
}

/// Query string of `GET /history`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// One of `1h`, `24h`, `7d` or `30d`. Defaults to `24h`.
    pub range: Option<String>,
    /// RFC 3339 reference time. Defaults to now.
    pub time: Option<String>,
}
