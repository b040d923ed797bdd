// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::coordinator::Coordinator;
use crate::worker::RefreshHandle;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) coordinator: Arc<Coordinator>,
    pub(crate) refresh: RefreshHandle,
}

pub fn app(coordinator: Arc<Coordinator>, refresh: RefreshHandle) -> Router {
    let state = AppState {
        coordinator,
        refresh,
    };
    Router::new()
        .route("/", get(|| async { "docker-monitor" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/containers", get(http::list_containers)) // GET /api/containers
        .route("/api/containers/{name}", get(http::get_container)) // GET /api/containers/{name}
        .route("/api/containers/{name}/start", post(http::start_container))
        .route("/api/containers/{name}/stop", post(http::stop_container))
        .route("/api/containers/{name}/restart", post(http::restart_container))
        .route("/api/refresh", post(http::refresh)) // POST /api/refresh
        .route("/ws/containers", get(ws::ws_containers)) // WS /ws/containers
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
