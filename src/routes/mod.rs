// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::aggregator::MetricsAggregator;
use crate::broadcaster::SubscriptionBroadcaster;
use crate::config::AppConfig;

pub use ws::envelope_for;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) aggregator: Arc<MetricsAggregator>,
    pub(crate) broadcaster: Arc<SubscriptionBroadcaster>,
    pub(crate) config: AppConfig,
}

pub fn app(
    aggregator: Arc<MetricsAggregator>,
    broadcaster: Arc<SubscriptionBroadcaster>,
    config: AppConfig,
) -> Router {
    let state = AppState {
        aggregator,
        broadcaster,
        config,
    };
    let monitoring = Router::new()
        .route("/system", get(http::system_handler))
        .route("/devices", get(http::devices_handler))
        .route("/devices/{id}", get(http::device_handler))
        .route("/devices/{id}/health", get(http::device_health_handler))
        .route("/groups", get(http::groups_handler))
        .route("/groups/{id}", get(http::group_handler))
        .route("/groups/{id}/health", get(http::group_health_handler))
        .route("/health", get(http::health_handler))
        .route("/connections", get(http::connections_handler))
        .route("/broadcast/system", post(http::broadcast_system_handler));

    Router::new()
        .route("/", get(|| async { "GPU telemetry service" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .nest("/api/v1/monitoring", monitoring)
        .route("/ws/system", get(ws::ws_system)) // WS /ws/system
        .route("/ws/devices/{id}", get(ws::ws_device)) // WS /ws/devices/{id}
        .route("/ws/groups/{id}", get(ws::ws_group)) // WS /ws/groups/{id}
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
