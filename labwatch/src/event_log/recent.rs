use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::{EventLog, EventLogError, EventRecord};

/// Bounded in-memory log of the most recent records.
///
/// Backs the status API. Once full, the oldest record is evicted.
#[derive(Debug)]
pub struct RecentEvents {
    capacity: usize,
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    records: VecDeque<EventRecord>,
}

impl RecentEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                next_seq: 1,
                records: VecDeque::with_capacity(capacity.max(1)),
            }),
        }
    }

    /// Up to `limit` records, oldest first.
    pub fn latest(&self, limit: usize) -> Vec<EventRecord> {
        let inner = self.inner.lock();
        let skip = inner.records.len().saturating_sub(limit);
        inner.records.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, event_type: &str, details: &Map<String, Value>) {
        let mut inner = self.inner.lock();
        let record = EventRecord::new(inner.next_seq, event_type, details.clone());
        inner.next_seq += 1;
        if inner.records.len() == self.capacity {
            inner.records.pop_front();
        }
        inner.records.push_back(record);
    }
}

#[async_trait]
impl EventLog for RecentEvents {
    async fn append(
        &self,
        event_type: &str,
        details: &Map<String, Value>,
    ) -> Result<(), EventLogError> {
        self.push(event_type, details);
        Ok(())
    }

    fn name(&self) -> &str {
        "recent"
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn details(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn should_number_records_in_order() {
        let log = RecentEvents::new(10);
        log.append("LIGHT_ON", &details(json!({"state": "on"})))
            .await
            .unwrap();
        log.append("LIGHT_OFF", &details(json!({"state": "off"})))
            .await
            .unwrap();

        let records = log.latest(10);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seq, 1);
        assert_eq!(records[0].event_type, "LIGHT_ON");
        assert_eq!(records[1].seq, 2);
        assert_eq!(records[1].details["state"], "off");
    }

    #[tokio::test]
    async fn should_evict_oldest_when_full() {
        let log = RecentEvents::new(3);
        for i in 0..5 {
            log.append("ALERT_GAS_HIGH", &details(json!({ "gas_level": i })))
                .await
                .unwrap();
        }

        let records = log.latest(10);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].seq, 3);
        assert_eq!(records[2].seq, 5);
    }

    #[tokio::test]
    async fn should_limit_to_newest() {
        let log = RecentEvents::new(10);
        for _ in 0..4 {
            log.append("DEVICE_ONLINE", &Map::new()).await.unwrap();
        }

        let records = log.latest(2);
        assert_eq!(
            records.iter().map(|r| r.seq).collect::<Vec<_>>(),
            vec![3, 4]
        );
    }

    #[test]
    fn should_start_empty() {
        let log = RecentEvents::new(0);
        assert!(log.is_empty());
        assert!(log.latest(5).is_empty());
    }
}
