// Stats coordinator: owns the engine client, the container registry and the last
// published dataset; drives poll cycles and container control.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};
use tokio::time::Duration;
use tracing::instrument;

use crate::client::ClientManager;
use crate::engine::{Connector, Engine};
use crate::error::{EngineError, MonitorError};
use crate::events::{self, REBUILD_CHANNEL_CAPACITY, RebuildRequest};
use crate::models::{ContainerRef, Dataset, DerivedMetrics};
use crate::rates;
use crate::registry::Registry;
use crate::stale_filter;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub url: String,
    pub connect_timeout: Duration,
    /// Upper bound on waiting for a fresh sample from one container's stream.
    pub stats_timeout: Duration,
    pub broadcast_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlAction {
    Start,
    Stop,
    Restart,
}

/// Outcome of deriving one container inside a poll cycle.
struct ContainerOutcome {
    name: String,
    metrics: DerivedMetrics,
    needs_refresh: bool,
}

pub struct Coordinator {
    clients: ClientManager,
    registry: RwLock<Arc<Registry>>,
    /// Last published dataset; also the "previous" state for the next poll.
    published: RwLock<Arc<Dataset>>,
    poll_guard: Mutex<()>,
    rebuild_guard: Mutex<()>,
    stats_timeout: Duration,
    updates_tx: broadcast::Sender<Arc<Dataset>>,
    rebuild_tx: mpsc::Sender<RebuildRequest>,
}

impl Coordinator {
    /// Returns the coordinator and the receiving end of its rebuild-request channel,
    /// which the scheduler drains.
    pub fn new(
        connector: Arc<dyn Connector>,
        config: CoordinatorConfig,
    ) -> (Self, mpsc::Receiver<RebuildRequest>) {
        let (updates_tx, _) = broadcast::channel(config.broadcast_capacity.max(1));
        let (rebuild_tx, rebuild_rx) = mpsc::channel(REBUILD_CHANNEL_CAPACITY);
        let coordinator = Self {
            clients: ClientManager::new(connector, config.url, config.connect_timeout),
            registry: RwLock::new(Arc::new(Registry::default())),
            published: RwLock::new(Arc::new(Dataset::new())),
            poll_guard: Mutex::new(()),
            rebuild_guard: Mutex::new(()),
            stats_timeout: config.stats_timeout,
            updates_tx,
            rebuild_tx,
        };
        (coordinator, rebuild_rx)
    }

    /// Connect, build the registry and start the event listener.
    /// A failed initial connection is fatal and returned to the caller.
    #[instrument(skip(self), fields(operation = "initialize"))]
    pub async fn initialize(&self) -> Result<tokio::task::JoinHandle<()>, MonitorError> {
        let engine = self.clients.connect().await?;
        self.rebuild_with(engine.as_ref()).await?;
        Ok(events::spawn_listener(engine, self.rebuild_tx.clone()))
    }

    /// (Re)start the event listener on the current client.
    pub async fn start_listener(&self) -> Result<tokio::task::JoinHandle<()>, MonitorError> {
        let engine = self.clients.current().await?;
        Ok(events::spawn_listener(engine, self.rebuild_tx.clone()))
    }

    /// Re-enumerate containers and reopen their stats streams, then swap the registry.
    pub async fn rebuild(&self) -> Result<(), MonitorError> {
        let engine = self.clients.current().await?;
        self.rebuild_with(engine.as_ref()).await
    }

    async fn rebuild_with(&self, engine: &dyn Engine) -> Result<(), MonitorError> {
        let _serial = self.rebuild_guard.lock().await;
        let registry = Registry::build(engine).await?;
        tracing::debug!(containers = registry.len(), "Registry rebuilt");
        *self.registry.write().await = Arc::new(registry);
        Ok(())
    }

    /// One poll cycle. Only one runs at a time; concurrent callers wait their turn.
    ///
    /// Containers without a fresh sample are published without metrics and schedule a
    /// registry rebuild after publication. A connection-class failure aborts the cycle,
    /// reconnects, rebuilds and is returned; the previous dataset stays published.
    #[instrument(skip(self), fields(operation = "poll"))]
    pub async fn poll(&self) -> Result<Arc<Dataset>, MonitorError> {
        let _flight = self.poll_guard.lock().await;

        match self.collect().await {
            Ok((dataset, needs_refresh)) => {
                let dataset = Arc::new(dataset);
                *self.published.write().await = dataset.clone();
                if self.updates_tx.send(dataset.clone()).is_err() {
                    tracing::trace!("No dataset subscribers");
                }
                tracing::debug!(containers = dataset.len(), "Dataset published");

                if needs_refresh {
                    tracing::debug!("Some refresh needed");
                    if let Err(e) = self.rebuild().await {
                        tracing::warn!(error = %e, operation = "rebuild", "Deferred rebuild failed");
                    }
                }
                Ok(dataset)
            }
            Err(e) => {
                tracing::warn!(error = %e, operation = "poll", "Poll failed, reconnecting");
                self.recover().await;
                Err(e)
            }
        }
    }

    async fn recover(&self) {
        match self.clients.reconnect().await {
            Ok(engine) => {
                if let Err(e) = self.rebuild_with(engine.as_ref()).await {
                    tracing::warn!(error = %e, operation = "rebuild", "Rebuild after reconnect failed");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, operation = "reconnect", "Reconnect failed");
            }
        }
    }

    /// Derive every container against one registry snapshot, one previous dataset and one `now`.
    async fn collect(&self) -> Result<(Dataset, bool), MonitorError> {
        let registry = self.registry.read().await.clone();
        let previous = self.published.read().await.clone();
        let now = Utc::now();

        let outcomes = join_all(
            registry
                .containers()
                .iter()
                .map(|c| self.derive(c, &registry, &previous, now)),
        )
        .await;

        let mut dataset = Dataset::new();
        let mut needs_refresh = false;
        for outcome in outcomes {
            let outcome = outcome.map_err(MonitorError::Connection)?;
            needs_refresh |= outcome.needs_refresh;
            dataset.insert(outcome.name, outcome.metrics);
        }
        Ok((dataset, needs_refresh))
    }

    /// Only connection-class errors escape; anything else is logged and flags a refresh.
    async fn derive(
        &self,
        container: &ContainerRef,
        registry: &Registry,
        previous: &Dataset,
        now: DateTime<Utc>,
    ) -> Result<ContainerOutcome, EngineError> {
        let mut metrics = DerivedMetrics {
            id: container.id.clone(),
            status: container.status,
            started_at: None,
            cpu: None,
            mem: None,
            net: None,
        };
        let outcome = |metrics, needs_refresh| ContainerOutcome {
            name: container.name.clone(),
            metrics,
            needs_refresh,
        };

        if !container.status.is_running() {
            return Ok(outcome(metrics, false));
        }
        metrics.started_at = container.started_at;

        let Some(stream) = registry.stream(&container.name) else {
            return Ok(outcome(metrics, true));
        };
        let mut stream = stream.lock().await;
        let sample = match stale_filter::next_fresh_sample(&mut stream, now, self.stats_timeout).await {
            Ok(Some(s)) => s,
            Ok(None) => {
                tracing::debug!(container = %container.name, "No fresh stats sample");
                return Ok(outcome(metrics, true));
            }
            Err(e) if e.is_connection() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    container = %container.name,
                    "Skipping container stats"
                );
                return Ok(outcome(metrics, true));
            }
        };

        let prev = previous.get(&container.name);
        metrics.cpu = Some(rates::compute_cpu(prev.and_then(|p| p.cpu.as_ref()), &sample));
        metrics.mem = Some(rates::compute_mem(&sample));
        metrics.net = Some(rates::compute_net(prev.and_then(|p| p.net.as_ref()), &sample));
        Ok(outcome(metrics, false))
    }

    pub async fn start_container(&self, name: &str) -> Result<(), MonitorError> {
        self.control(name, ControlAction::Start).await
    }

    pub async fn stop_container(&self, name: &str) -> Result<(), MonitorError> {
        self.control(name, ControlAction::Stop).await
    }

    pub async fn restart_container(&self, name: &str) -> Result<(), MonitorError> {
        self.control(name, ControlAction::Restart).await
    }

    #[instrument(skip(self), fields(operation = "control"))]
    async fn control(&self, name: &str, action: ControlAction) -> Result<(), MonitorError> {
        let container = {
            let registry = self.registry.read().await;
            registry
                .find(name)
                .cloned()
                .ok_or_else(|| MonitorError::ContainerNotFound(name.to_string()))?
        };
        let engine = self.clients.current().await?;
        let result = match action {
            ControlAction::Start => engine.start(&container).await,
            ControlAction::Stop => engine.stop(&container).await,
            ControlAction::Restart => engine.restart(&container).await,
        };
        result.map_err(MonitorError::from)
    }

    /// Last published dataset. Never waits for an in-flight poll.
    pub async fn current_data(&self) -> Arc<Dataset> {
        self.published.read().await.clone()
    }

    /// Receives every newly published dataset.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Dataset>> {
        self.updates_tx.subscribe()
    }

    /// Names of containers in the current registry snapshot.
    pub async fn tracked_containers(&self) -> Vec<String> {
        let registry = self.registry.read().await;
        registry.containers().iter().map(|c| c.name.clone()).collect()
    }
}
