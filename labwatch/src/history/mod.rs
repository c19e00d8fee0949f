//! Sensor sample history.
//!
//! Every decoded sample is stored, independent of alerting, so readings
//! can be charted later. Stores are written from the dispatcher and a
//! failing store never affects evaluation.

mod jsonl;
mod memory;

pub use jsonl::JsonLinesSampleLog;
pub use memory::SampleHistory;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::event_log::EventLogError;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// One stored sample.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SampleRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
    pub values: BTreeMap<String, f64>,
}

impl SampleRecord {
    pub fn new(recorded_at: OffsetDateTime, values: BTreeMap<String, f64>) -> Self {
        Self {
            recorded_at,
            values,
        }
    }
}

/// Destination for stored samples.
#[async_trait]
pub trait SampleStore: Send + Sync {
    async fn save(&self, record: &SampleRecord) -> Result<(), EventLogError>;

    /// Name used in logs when a save fails.
    fn name(&self) -> &str;
}

/// Span covered by a history query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
pub enum HistoryRange {
    /// Last hour in one-minute buckets.
    #[strum(serialize = "1h")]
    LastHour,

    /// Last 24 hours in one-hour buckets.
    #[default]
    #[strum(serialize = "24h")]
    LastDay,

    /// Last seven days in one-day buckets.
    #[strum(serialize = "7d")]
    LastWeek,

    /// The whole calendar month (UTC) in one-day buckets.
    #[strum(serialize = "30d")]
    Month,
}

/// Inclusive time window and the bucket width used inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
    pub bucket: Duration,
}

impl Window {
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.start <= at && at <= self.end
    }
}

impl HistoryRange {
    /// The window ending at `at`, or for [`HistoryRange::Month`] the
    /// calendar month containing it.
    pub fn window(self, at: OffsetDateTime) -> Window {
        let at = at.to_offset(time::UtcOffset::UTC);
        match self {
            HistoryRange::LastHour => Window {
                start: at - HOUR,
                end: at,
                bucket: MINUTE,
            },
            HistoryRange::LastDay => Window {
                start: at - DAY,
                end: at,
                bucket: HOUR,
            },
            HistoryRange::LastWeek => Window {
                start: at - DAY * 7,
                end: at,
                bucket: DAY,
            },
            HistoryRange::Month => {
                let first = first_of_month(at.date());
                let next = first_of_month(first + time::Duration::days(32));
                Window {
                    start: first.midnight().assume_utc(),
                    end: next.midnight().assume_utc() - Duration::from_nanos(1),
                    bucket: DAY,
                }
            }
        }
    }
}

fn first_of_month(date: time::Date) -> time::Date {
    date - time::Duration::days(i64::from(date.day()) - 1)
}

/// Averages over one bucket.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct HistoryBucket {
    /// Bucket start, RFC 3339 in UTC.
    pub time_bucket: String,
    pub samples: usize,
    /// Mean per signal key. Keys missing from every sample in the bucket
    /// are left out.
    pub averages: BTreeMap<String, f64>,
}
