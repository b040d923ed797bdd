// Engine client connection handle: connect once, reconnect after failures.

use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, timeout};
use tracing::instrument;

use crate::engine::{Connector, Engine};
use crate::error::{EngineError, MonitorError};

pub struct ClientManager {
    connector: Arc<dyn Connector>,
    url: String,
    connect_timeout: Duration,
    client: RwLock<Option<Arc<dyn Engine>>>,
}

impl ClientManager {
    pub fn new(connector: Arc<dyn Connector>, url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            connector,
            url: url.into(),
            connect_timeout,
            client: RwLock::new(None),
        }
    }

    /// One connection attempt with the configured URL; replaces the current client on success.
    /// On failure the previous client (if any) is kept.
    #[instrument(skip(self), fields(operation = "connect", url = %self.url))]
    pub async fn connect(&self) -> Result<Arc<dyn Engine>, MonitorError> {
        let client = match timeout(self.connect_timeout, self.connector.connect(&self.url)).await {
            Ok(Ok(c)) => c,
            Ok(Err(e)) => return Err(MonitorError::Connection(e)),
            Err(_) => {
                return Err(MonitorError::Connection(EngineError::Connection(format!(
                    "connect timed out after {:?}",
                    self.connect_timeout
                ))));
            }
        };
        *self.client.write().await = Some(client.clone());
        tracing::info!("Connected to container engine");
        Ok(client)
    }

    /// Called after a connection-class failure; no backoff, a single attempt.
    pub async fn reconnect(&self) -> Result<Arc<dyn Engine>, MonitorError> {
        tracing::info!(url = %self.url, "Reconnecting to container engine");
        self.connect().await
    }

    pub async fn current(&self) -> Result<Arc<dyn Engine>, MonitorError> {
        self.client.read().await.clone().ok_or_else(|| {
            MonitorError::Connection(EngineError::Connection("engine client not connected".into()))
        })
    }
}
