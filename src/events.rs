// Lifecycle event listener. Runs as its own task and only enqueues rebuild requests;
// the scheduler executes them against the coordinator.

use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::engine::Engine;

/// Marker sent to the scheduler for each qualifying lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildRequest;

/// Capacity of the rebuild channel. A full channel already holds a pending rebuild,
/// so further events in the same burst are dropped.
pub const REBUILD_CHANNEL_CAPACITY: usize = 1;

/// Spawn the listener. It ends when the feed closes, yields an error, or the scheduler
/// drops the receiving side; it never retries.
pub fn spawn_listener(
    engine: Arc<dyn Engine>,
    rebuild_tx: mpsc::Sender<RebuildRequest>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!("Starting listening to events");
        let mut events = engine.events();

        while let Some(result) = events.next().await {
            match result {
                Ok(event) => {
                    tracing::debug!(
                        action = %event.action,
                        container = %event.container,
                        "Received lifecycle event"
                    );
                    match rebuild_tx.try_send(RebuildRequest) {
                        Ok(()) | Err(TrySendError::Full(_)) => {}
                        Err(TrySendError::Closed(_)) => {
                            tracing::debug!("Rebuild channel closed");
                            break;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, operation = "events", "Event feed failed");
                    break;
                }
            }
        }
        tracing::debug!("Event listening stopped");
    })
}
