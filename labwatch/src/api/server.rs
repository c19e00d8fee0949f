//! API server wiring: shared state, router assembly and the listener.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use super::v0;
use crate::alert::DeviceSnapshot;
use crate::event_log::RecentEvents;
use crate::history::SampleHistory;
use crate::tracing::prelude::*;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "labwatch API",
        description = "Read-only status of the lab alerting service",
    ),
    tags(
        (name = "health", description = "Liveness"),
        (name = "events", description = "Recent audit records"),
        (name = "devices", description = "Device presence and actuator states"),
        (name = "history", description = "Averaged sensor readings"),
    ),
)]
struct ApiDoc;

/// State handed to every handler.
#[derive(Clone)]
pub struct SharedState {
    pub events: Arc<RecentEvents>,
    pub history: Arc<SampleHistory>,
    pub devices: watch::Receiver<DeviceSnapshot>,
}

impl SharedState {
    pub fn device_snapshot(&self) -> DeviceSnapshot {
        self.devices.borrow().clone()
    }
}

/// Build the full router, including Swagger UI.
pub fn router(state: SharedState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .nest("/api/v0", v0::routes())
        .split_for_parts();

    router
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(TraceLayer::new_for_http())
}

/// Serve the API on `addr` until `cancel` fires.
pub async fn serve(
    addr: SocketAddr,
    state: SharedState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "API server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("API server stopped");
    Ok(())
}
