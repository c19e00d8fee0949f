//! API v0 endpoints.
//!
//! Version 0 signals an unstable API; breaking changes are expected.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use utoipa_axum::{router::OpenApiRouter, routes};

use super::server::SharedState;
use crate::api_client::types::{
    DeviceSnapshot, EventRecord, EventsQuery, HistoryBucket, HistoryQuery, HistoryRange,
};

/// Build the v0 API routes with OpenAPI metadata.
pub fn routes() -> OpenApiRouter<SharedState> {
    OpenApiRouter::new()
        .routes(routes!(health))
        .routes(routes!(get_events))
        .routes(routes!(get_devices))
        .routes(routes!(get_history))
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = OK, description = "Server is running", body = String),
    ),
)]
async fn health() -> &'static str {
    "OK"
}

/// Return the most recent audit records, oldest first.
#[utoipa::path(
    get,
    path = "/events",
    tag = "events",
    params(EventsQuery),
    responses(
        (status = OK, description = "Recent audit records", body = Vec<EventRecord>),
    ),
)]
async fn get_events(
    State(state): State<SharedState>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<EventRecord>> {
    Json(state.events.latest(query.limit()))
}

/// Return the last known device presence and actuator states.
#[utoipa::path(
    get,
    path = "/devices",
    tag = "devices",
    responses(
        (status = OK, description = "Current device state", body = DeviceSnapshot),
    ),
)]
async fn get_devices(State(state): State<SharedState>) -> Json<DeviceSnapshot> {
    Json(state.device_snapshot())
}

/// Return per-bucket averages of stored samples, oldest bucket first.
#[utoipa::path(
    get,
    path = "/history",
    tag = "history",
    params(HistoryQuery),
    responses(
        (status = OK, description = "Averaged readings", body = Vec<HistoryBucket>),
        (status = BAD_REQUEST, description = "Unknown range or malformed time"),
    ),
)]
async fn get_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryBucket>>, StatusCode> {
    let range = match query.range.as_deref() {
        Some(range) => range
            .parse::<HistoryRange>()
            .map_err(|_| StatusCode::BAD_REQUEST)?,
        None => HistoryRange::default(),
    };
    let at = match query.time.as_deref() {
        Some(time) => {
            OffsetDateTime::parse(time, &Rfc3339).map_err(|_| StatusCode::BAD_REQUEST)?
        }
        None => OffsetDateTime::now_utc(),
    };
    Ok(Json(state.history.aggregate(range, at)))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Map;
    use time::macros::datetime;
    use tokio::sync::watch;
    use tower::ServiceExt;

    use super::*;
    use crate::api::router;
    use crate::event_log::{EventLog, RecentEvents};
    use crate::history::{SampleHistory, SampleRecord, SampleStore};

    async fn get(state: SharedState, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    fn state() -> (SharedState, watch::Sender<DeviceSnapshot>) {
        let (tx, devices) = watch::channel(DeviceSnapshot::default());
        let state = SharedState {
            events: Arc::new(RecentEvents::new(100)),
            history: Arc::new(SampleHistory::new(100)),
            devices,
        };
        (state, tx)
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let (state, _tx) = state();
        let (status, body) = get(state, "/api/v0/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
    }

    #[tokio::test]
    async fn events_default_to_latest_fifty() {
        let (state, _tx) = state();
        for _ in 0..60 {
            state
                .events
                .append("ALERT_TEMP_HIGH", &Map::new())
                .await
                .unwrap();
        }

        let (status, body) = get(state, "/api/v0/events").await;
        assert_eq!(status, StatusCode::OK);
        let records: Vec<EventRecord> = serde_json::from_slice(&body).unwrap();
        assert_eq!(records.len(), 50);
        assert_eq!(records[0].seq, 11);
        assert_eq!(records[49].seq, 60);
    }

    #[tokio::test]
    async fn events_honor_limit() {
        let (state, _tx) = state();
        state.events.append("DEVICE_ONLINE", &Map::new()).await.unwrap();
        state.events.append("LIGHT_ON", &Map::new()).await.unwrap();

        let (_, body) = get(state, "/api/v0/events?limit=1").await;
        let records: Vec<EventRecord> = serde_json::from_slice(&body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "LIGHT_ON");
    }

    #[tokio::test]
    async fn events_reject_bad_limit() {
        let (state, _tx) = state();
        let (status, _) = get(state, "/api/v0/events?limit=many").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn devices_reflect_latest_snapshot() {
        let (state, tx) = state();
        tx.send_replace(DeviceSnapshot {
            online: Some(true),
            actuators: BTreeMap::from([("light".to_string(), "on".to_string())]),
        });

        let (status, body) = get(state, "/api/v0/devices").await;
        assert_eq!(status, StatusCode::OK);
        let snapshot: DeviceSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(snapshot.online, Some(true));
        assert_eq!(snapshot.actuators["light"], "on");
    }

    #[tokio::test]
    async fn history_averages_per_minute_bucket() {
        let (state, _tx) = state();
        for (second, temperature) in [(5, 24.0), (50, 26.0)] {
            let at = datetime!(2025-03-10 11:45 UTC) + time::Duration::seconds(second);
            let values = BTreeMap::from([("temperature".to_string(), temperature)]);
            state
                .history
                .save(&SampleRecord::new(at, values))
                .await
                .unwrap();
        }

        let (status, body) = get(state, "/api/v0/history?range=1h&time=2025-03-10T12:00:00Z").await;
        assert_eq!(status, StatusCode::OK);
        let buckets: Vec<HistoryBucket> = serde_json::from_slice(&body).unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].time_bucket, "2025-03-10T11:45:00Z");
        assert_eq!(buckets[0].samples, 2);
        assert_eq!(buckets[0].averages["temperature"], 25.0);
    }

    #[tokio::test]
    async fn history_defaults_to_last_day() {
        let (state, _tx) = state();
        let (status, body) = get(state, "/api/v0/history").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"[]");
    }

    #[tokio::test]
    async fn history_rejects_bad_query() {
        let (state, _tx) = state();
        let (status, _) = get(state.clone(), "/api/v0/history?range=2w").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get(state, "/api/v0/history?time=yesterday").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn openapi_document_lists_routes() {
        let (state, _tx) = state();
        let (status, body) = get(state, "/api-docs/openapi.json").await;
        assert_eq!(status, StatusCode::OK);
        let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
        for path in [
            "/api/v0/health",
            "/api/v0/events",
            "/api/v0/devices",
            "/api/v0/history",
        ] {
            assert!(doc["paths"].get(path).is_some(), "missing {path}");
        }
    }
}
