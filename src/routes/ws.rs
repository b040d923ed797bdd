// WebSocket push of every published dataset

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{Duration, timeout};

use super::AppState;
use crate::models::Dataset;

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub(super) async fn ws_containers(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let coordinator = state.coordinator.clone();
    ws.on_upgrade(move |socket| async move {
        // Subscribe before reading the current dataset so nothing published in between is missed.
        let mut rx = coordinator.subscribe();
        let current = coordinator.current_data().await;
        if let Err(e) = stream_containers(socket, current, &mut rx).await {
            tracing::info!("Containers stream error: {}", e);
        }
    })
}

/// Returns false when the client is gone or too slow.
async fn send_dataset(socket: &mut WebSocket, dataset: &Dataset) -> anyhow::Result<bool> {
    let json = serde_json::to_string(dataset)?;
    let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Text(json.into()))).await;
    Ok(matches!(r, Ok(Ok(()))))
}

async fn stream_containers(
    mut socket: WebSocket,
    current: Arc<Dataset>,
    rx: &mut broadcast::Receiver<Arc<Dataset>>,
) -> anyhow::Result<()> {
    tracing::info!("Client connected to containers stream");
    if !send_dataset(&mut socket, &current).await? {
        return Ok(());
    }

    let mut ping_interval = tokio::time::interval(WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(dataset) => {
                        if !send_dataset(&mut socket, &dataset).await? {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("WebSocket /ws/containers client lagged, skipped {} datasets", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = ping_interval.tick() => {
                let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Ping(Bytes::new()))).await;
                if !matches!(r, Ok(Ok(()))) {
                    break;
                }
            }
        }
    }
    Ok(())
}
