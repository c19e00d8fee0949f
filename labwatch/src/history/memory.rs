use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{HistoryBucket, HistoryRange, SampleRecord, SampleStore};
use crate::event_log::EventLogError;

/// Bounded in-memory sample history. Backs the history API.
///
/// Once full, the oldest sample is evicted.
#[derive(Debug)]
pub struct SampleHistory {
    capacity: usize,
    samples: Mutex<VecDeque<SampleRecord>>,
}

impl SampleHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    fn push(&self, record: SampleRecord) {
        let mut samples = self.samples.lock();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(record);
    }

    /// Per-bucket averages over `range` as seen from `at`, oldest bucket
    /// first. Empty buckets are omitted.
    pub fn aggregate(&self, range: HistoryRange, at: OffsetDateTime) -> Vec<HistoryBucket> {
        let window = range.window(at);
        let width = window.bucket.as_nanos() as i128;

        let mut buckets: BTreeMap<i128, Accumulator> = BTreeMap::new();
        for record in self.samples.lock().iter() {
            if !window.contains(record.recorded_at) {
                continue;
            }
            let ts = record.recorded_at.unix_timestamp_nanos();
            let start = ts - ts.rem_euclid(width);
            buckets.entry(start).or_default().add(&record.values);
        }

        buckets
            .into_iter()
            .filter_map(|(start, acc)| {
                let start = OffsetDateTime::from_unix_timestamp_nanos(start).ok()?;
                Some(acc.finish(start))
            })
            .collect()
    }
}

#[derive(Default)]
struct Accumulator {
    samples: usize,
    sums: BTreeMap<String, (f64, u32)>,
}

impl Accumulator {
    fn add(&mut self, values: &BTreeMap<String, f64>) {
        self.samples += 1;
        for (key, value) in values {
            let (sum, count) = self.sums.entry(key.clone()).or_default();
            *sum += value;
            *count += 1;
        }
    }

    fn finish(self, start: OffsetDateTime) -> HistoryBucket {
        HistoryBucket {
            time_bucket: start.format(&Rfc3339).unwrap_or_else(|_| start.to_string()),
            samples: self.samples,
            averages: self
                .sums
                .into_iter()
                .map(|(key, (sum, count))| (key, sum / f64::from(count)))
                .collect(),
        }
    }
}

#[async_trait]
impl SampleStore for SampleHistory {
    async fn save(&self, record: &SampleRecord) -> Result<(), EventLogError> {
        self.push(record.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "history"
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn record(at: OffsetDateTime, values: &[(&str, f64)]) -> SampleRecord {
        SampleRecord::new(
            at,
            values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        )
    }

    #[tokio::test]
    async fn should_average_samples_per_hour() {
        let history = SampleHistory::new(100);
        for r in [
            record(datetime!(2025-03-10 10:05 UTC), &[("temperature", 20.0), ("gas", 300.0)]),
            record(datetime!(2025-03-10 10:40 UTC), &[("temperature", 22.0)]),
            record(datetime!(2025-03-10 11:15 UTC), &[("temperature", 30.0)]),
        ] {
            history.save(&r).await.unwrap();
        }

        let buckets = history.aggregate(HistoryRange::LastDay, datetime!(2025-03-10 12:00 UTC));

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].time_bucket, "2025-03-10T10:00:00Z");
        assert_eq!(buckets[0].samples, 2);
        assert_eq!(buckets[0].averages["temperature"], 21.0);
        assert_eq!(buckets[0].averages["gas"], 300.0);
        assert_eq!(buckets[1].time_bucket, "2025-03-10T11:00:00Z");
        assert!(!buckets[1].averages.contains_key("gas"));
    }

    #[tokio::test]
    async fn should_skip_samples_outside_window() {
        let history = SampleHistory::new(100);
        history
            .save(&record(datetime!(2025-03-10 10:59 UTC), &[("lux", 100.0)]))
            .await
            .unwrap();
        history
            .save(&record(datetime!(2025-03-10 11:30 UTC), &[("lux", 40.0)]))
            .await
            .unwrap();

        let buckets = history.aggregate(HistoryRange::LastHour, datetime!(2025-03-10 12:00 UTC));

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].time_bucket, "2025-03-10T11:30:00Z");
        assert_eq!(buckets[0].averages["lux"], 40.0);
    }

    #[tokio::test]
    async fn should_bucket_month_by_day() {
        let history = SampleHistory::new(100);
        for at in [
            datetime!(2025-01-31 23:00 UTC),
            datetime!(2025-02-01 01:00 UTC),
            datetime!(2025-02-01 18:00 UTC),
            datetime!(2025-02-28 12:00 UTC),
        ] {
            history.save(&record(at, &[("gas", 100.0)])).await.unwrap();
        }

        let buckets = history.aggregate(HistoryRange::Month, datetime!(2025-02-10 00:00 UTC));

        let days: Vec<_> = buckets.iter().map(|b| b.time_bucket.as_str()).collect();
        assert_eq!(days, vec!["2025-02-01T00:00:00Z", "2025-02-28T00:00:00Z"]);
        assert_eq!(buckets[0].samples, 2);
    }

    #[tokio::test]
    async fn should_evict_oldest_when_full() {
        let history = SampleHistory::new(2);
        for minute in [1, 2, 3] {
            let at = datetime!(2025-03-10 11:00 UTC) + time::Duration::minutes(minute);
            history.save(&record(at, &[("lux", minute as f64)])).await.unwrap();
        }

        assert_eq!(history.len(), 2);
        let buckets = history.aggregate(HistoryRange::LastHour, datetime!(2025-03-10 11:30 UTC));
        assert_eq!(buckets[0].averages["lux"], 2.0);
    }
}
