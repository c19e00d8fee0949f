//! HTTP client for the status API.

pub mod types;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use types::{DeviceSnapshot, EventRecord, HistoryBucket, HistoryRange};

/// Base URL used when none is given.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7786";

pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn get_health(&self) -> Result<String> {
        let response = self
            .http
            .get(self.url("/health"))
            .send()
            .await
            .with_context(|| format!("cannot reach {}", self.base_url))?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    /// Most recent `limit` audit records, oldest first.
    pub async fn get_events(&self, limit: usize) -> Result<Vec<EventRecord>> {
        self.get_json(&format!("/events?limit={limit}")).await
    }

    pub async fn get_devices(&self) -> Result<DeviceSnapshot> {
        self.get_json("/devices").await
    }

    /// Averaged readings over `range`, ending now.
    pub async fn get_history(&self, range: HistoryRange) -> Result<Vec<HistoryBucket>> {
        self.get_json(&format!("/history?range={range}")).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("cannot reach {}", self.base_url))?
            .error_for_status()?;
        response
            .json()
            .await
            .with_context(|| format!("unexpected response from {url}"))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v0{path}", self.base_url)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Map;
    use tokio::sync::watch;

    use super::*;
    use crate::api::{SharedState, router};
    use crate::event_log::{EventLog, RecentEvents};
    use crate::history::{SampleHistory, SampleRecord, SampleStore};

    async fn spawn_api(state: SharedState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn should_talk_to_running_api() {
        let events = Arc::new(RecentEvents::new(10));
        events.append("DEVICE_ONLINE", &Map::new()).await.unwrap();
        events.append("FAN_ON", &Map::new()).await.unwrap();
        let (_tx, devices) = watch::channel(DeviceSnapshot {
            online: Some(false),
            ..Default::default()
        });
        let history = Arc::new(SampleHistory::new(10));
        let values = [("gas".to_string(), 420.0)].into_iter().collect();
        history
            .save(&SampleRecord::new(time::OffsetDateTime::now_utc(), values))
            .await
            .unwrap();
        let state = SharedState {
            events,
            history,
            devices,
        };
        let client = Client::with_base_url(spawn_api(state).await);

        assert_eq!(client.get_health().await.unwrap(), "OK");

        let records = client.get_events(1).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "FAN_ON");

        assert_eq!(client.get_devices().await.unwrap().online, Some(false));

        let buckets = client.get_history(HistoryRange::LastHour).await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].averages["gas"], 420.0);
    }

    #[tokio::test]
    async fn should_report_unreachable_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::with_base_url(format!("http://{addr}"));
        let err = client.get_health().await.unwrap_err();
        assert!(err.to_string().contains("cannot reach"), "{err}");
    }
}
