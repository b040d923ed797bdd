// HTTP handlers: version, current data, container control, refresh

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::error::MonitorError;

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/containers: last published dataset, keyed by container name.
pub(super) async fn list_containers(State(state): State<AppState>) -> impl IntoResponse {
    let data = state.coordinator.current_data().await;
    Json(data.as_ref().clone())
}

pub(super) async fn get_container(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    let data = state.coordinator.current_data().await;
    match data.get(&name) {
        Some(metrics) => Json(metrics.clone()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, &MonitorError::ContainerNotFound(name)),
    }
}

pub(super) async fn start_container(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    control_response(state.coordinator.start_container(&name).await)
}

pub(super) async fn stop_container(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    control_response(state.coordinator.stop_container(&name).await)
}

pub(super) async fn restart_container(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    control_response(state.coordinator.restart_container(&name).await)
}

/// POST /api/refresh: queue a debounced on-demand poll.
pub(super) async fn refresh(State(state): State<AppState>) -> StatusCode {
    if state.refresh.request_refresh() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

fn control_response(result: Result<(), MonitorError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e @ MonitorError::ContainerNotFound(_)) => error_response(StatusCode::NOT_FOUND, &e),
        Err(e) => {
            tracing::warn!(error = %e, "Container control failed");
            error_response(StatusCode::BAD_GATEWAY, &e)
        }
    }
}

fn error_response(status: StatusCode, e: &MonitorError) -> Response {
    (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}
