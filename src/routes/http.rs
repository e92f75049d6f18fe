// GET handlers: version, monitoring snapshots, health, connection stats;
// POST handler for on-demand system broadcast

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

use super::AppState;
use super::ws::envelope_for;
use crate::broadcaster::Topic;
use crate::models::DataSource;
use crate::version::{NAME, VERSION};

#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<DataSource>,
}

fn ok<T: Serialize>(data: T, source: Option<DataSource>) -> Response {
    Json(ApiResponse {
        success: true,
        data,
        source,
    })
    .into_response()
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": format!("{what} not found") })),
    )
        .into_response()
}

/// GET /version returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/v1/monitoring/system: `data` is null until the first system pass.
pub(super) async fn system_handler(State(state): State<AppState>) -> Response {
    let agg = &state.aggregator;
    ok(agg.system_metrics(), Some(agg.current_source()))
}

/// GET /api/v1/monitoring/devices: sorted by device id.
pub(super) async fn devices_handler(State(state): State<AppState>) -> Response {
    let agg = &state.aggregator;
    let mut devices: Vec<_> = agg.all_device_metrics().into_values().collect();
    devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
    ok(devices, Some(agg.current_source()))
}

pub(super) async fn device_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.aggregator.device_metrics(&id) {
        Some(device) => {
            let source = device.source;
            ok(device, Some(source))
        }
        None => not_found("Device"),
    }
}

pub(super) async fn groups_handler(State(state): State<AppState>) -> Response {
    let agg = &state.aggregator;
    let mut groups: Vec<_> = agg.all_group_metrics().into_values().collect();
    groups.sort_by(|a, b| a.group_id.cmp(&b.group_id));
    ok(groups, Some(agg.current_source()))
}

pub(super) async fn group_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let agg = &state.aggregator;
    match agg.group_metrics(&id) {
        Some(group) => ok(group, Some(agg.current_source())),
        None => not_found("Group"),
    }
}

pub(super) async fn health_handler(State(state): State<AppState>) -> Response {
    ok(state.aggregator.system_health(), None)
}

/// Unknown ids report status `unknown` rather than 404.
pub(super) async fn device_health_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    ok(state.aggregator.device_health(&id), None)
}

pub(super) async fn group_health_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    ok(state.aggregator.group_health(&id), None)
}

pub(super) async fn connections_handler(State(state): State<AppState>) -> Response {
    ok(state.broadcaster.connection_stats(), None)
}

/// POST /api/v1/monitoring/broadcast/system pushes the current system
/// snapshot to every system subscriber now.
pub(super) async fn broadcast_system_handler(State(state): State<AppState>) -> Response {
    let Some(json) = envelope_for(&state.aggregator, &Topic::System) else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "success": false, "error": "System metrics not collected yet" })),
        )
            .into_response();
    };
    let delivered = state.broadcaster.broadcast(&Topic::System, &json);
    tracing::info!(operation = "broadcast_system", delivered, "system update broadcast");
    Json(json!({
        "success": true,
        "message": "System update broadcast",
        "delivered": delivered,
    }))
    .into_response()
}
