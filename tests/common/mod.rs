// Shared test helpers: an in-memory engine with scripted containers, stats feeds and events.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use docker_monitor::coordinator::{Coordinator, CoordinatorConfig};
use docker_monitor::engine::{Connector, Engine, EventStream, LifecycleEvent, SampleStream};
use docker_monitor::error::EngineError;
use docker_monitor::models::{
    ContainerRef, ContainerStatus, CpuCounters, MemoryCounters, NetCounters, RawSample,
};
use futures_util::{StreamExt, stream};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// How a container's stats stream behaves once opened.
#[derive(Debug, Clone, Copy)]
pub enum Feed {
    /// Endless samples stamped at read time; every counter grows by a fixed step per sample.
    Live,
    /// One sample ten seconds old, then the stream ends.
    Stale,
    /// Never yields.
    Silent,
    /// Transport failure on first read.
    Disconnected,
    /// Undecodable sample.
    Malformed,
}

pub const CPU_STEP: u64 = 10_000_000;
pub const SYSTEM_STEP: u64 = 100_000_000;
pub const ONLINE_CPUS: u32 = 2;
pub const NET_STEP: u64 = 1_000;
pub const MEM_USAGE: u64 = 600;
pub const MEM_INACTIVE: u64 = 100;
pub const MEM_LIMIT: u64 = 1_000;

pub fn sample(n: u64, read: chrono::DateTime<Utc>) -> RawSample {
    let mut networks = BTreeMap::new();
    networks.insert(
        "eth0".to_string(),
        NetCounters {
            rx_bytes: n * NET_STEP,
            tx_bytes: n * NET_STEP * 2,
        },
    );
    RawSample {
        read,
        cpu: CpuCounters {
            container: n * CPU_STEP,
            system: n * SYSTEM_STEP,
            online_cpus: ONLINE_CPUS,
        },
        memory: MemoryCounters {
            usage: MEM_USAGE,
            limit: MEM_LIMIT,
            inactive_file: MEM_INACTIVE,
        },
        networks,
    }
}

pub struct FakeEngine {
    containers: Mutex<Vec<ContainerRef>>,
    feeds: Mutex<HashMap<String, Feed>>,
    events_tx: Mutex<broadcast::Sender<LifecycleEvent>>,
    actions: Mutex<Vec<(String, String)>>,
    pub list_calls: AtomicUsize,
    pub broken: AtomicBool,
}

impl Default for FakeEngine {
    fn default() -> Self {
        let (events_tx, _) = broadcast::channel(16);
        Self {
            containers: Mutex::new(Vec::new()),
            feeds: Mutex::new(HashMap::new()),
            events_tx: Mutex::new(events_tx),
            actions: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            broken: AtomicBool::new(false),
        }
    }
}

impl FakeEngine {
    /// Add or replace a container. Running containers get a start time of now.
    pub fn put(&self, name: &str, status: ContainerStatus, feed: Feed) {
        let container = ContainerRef {
            id: format!("id-{name}"),
            name: name.to_string(),
            status,
            started_at: status.is_running().then(Utc::now),
        };
        let mut containers = self.containers.lock().unwrap();
        containers.retain(|c| c.name != name);
        containers.push(container);
        self.feeds.lock().unwrap().insert(name.to_string(), feed);
    }

    pub fn set_feed(&self, name: &str, feed: Feed) {
        self.feeds.lock().unwrap().insert(name.to_string(), feed);
    }

    pub fn emit(&self, action: &str, container: &str) {
        let _ = self.events_tx.lock().unwrap().send(LifecycleEvent {
            action: action.to_string(),
            container: container.to_string(),
        });
    }

    /// Close every open event feed; feeds opened afterwards work normally.
    pub fn end_event_feeds(&self) {
        let (fresh, _) = broadcast::channel(16);
        *self.events_tx.lock().unwrap() = fresh;
    }

    pub fn actions(&self) -> Vec<(String, String)> {
        self.actions.lock().unwrap().clone()
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn record(&self, action: &str, container: &ContainerRef, status: Option<ContainerStatus>) {
        self.actions
            .lock()
            .unwrap()
            .push((action.to_string(), container.name.clone()));
        if let Some(status) = status {
            let mut containers = self.containers.lock().unwrap();
            if let Some(c) = containers.iter_mut().find(|c| c.name == container.name) {
                c.status = status;
            }
        }
    }

    fn check(&self) -> Result<(), EngineError> {
        if self.broken.load(Ordering::SeqCst) {
            Err(EngineError::Connection("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn list_containers(&self) -> Result<Vec<ContainerRef>, EngineError> {
        self.check()?;
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.containers.lock().unwrap().clone())
    }

    fn stats_stream(&self, container: &ContainerRef) -> SampleStream {
        let feed = self
            .feeds
            .lock()
            .unwrap()
            .get(&container.name)
            .copied()
            .unwrap_or(Feed::Silent);
        match feed {
            Feed::Live => stream::iter(0u64..)
                .map(|n| Ok(sample(n, Utc::now())))
                .boxed(),
            Feed::Stale => {
                let read = Utc::now() - ChronoDuration::seconds(10);
                stream::iter(vec![Ok(sample(1, read))]).boxed()
            }
            Feed::Silent => stream::pending().boxed(),
            Feed::Disconnected => {
                stream::iter(vec![Err(EngineError::Connection("broken pipe".into()))]).boxed()
            }
            Feed::Malformed => {
                stream::iter(vec![Err(EngineError::Malformed("bad stats json".into()))]).boxed()
            }
        }
    }

    fn events(&self) -> EventStream {
        let rx = self.events_tx.lock().unwrap().subscribe();
        stream::unfold(rx, |mut rx| async move {
            match rx.recv().await {
                Ok(event) => Some((Ok(event), rx)),
                Err(_) => None,
            }
        })
        .boxed()
    }

    async fn start(&self, container: &ContainerRef) -> Result<(), EngineError> {
        self.check()?;
        self.record("start", container, Some(ContainerStatus::Running));
        Ok(())
    }

    async fn stop(&self, container: &ContainerRef) -> Result<(), EngineError> {
        self.check()?;
        self.record("stop", container, Some(ContainerStatus::Exited));
        Ok(())
    }

    async fn restart(&self, container: &ContainerRef) -> Result<(), EngineError> {
        self.check()?;
        self.record("restart", container, None);
        Ok(())
    }
}

/// Always hands out the same fake engine unless told to refuse.
pub struct FakeConnector {
    pub engine: Arc<FakeEngine>,
    pub connects: AtomicUsize,
    pub refuse: AtomicBool,
}

impl FakeConnector {
    pub fn new(engine: Arc<FakeEngine>) -> Self {
        Self {
            engine,
            connects: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _url: &str) -> Result<Arc<dyn Engine>, EngineError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(EngineError::Connection("connection refused".into()));
        }
        let engine: Arc<dyn Engine> = self.engine.clone();
        Ok(engine)
    }
}

pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        url: "unix:///var/run/docker.sock".into(),
        connect_timeout: Duration::from_secs(1),
        stats_timeout: Duration::from_millis(300),
        broadcast_capacity: 16,
    }
}

pub struct Harness {
    pub engine: Arc<FakeEngine>,
    pub connector: Arc<FakeConnector>,
    pub coordinator: Arc<Coordinator>,
    pub rebuild_rx: mpsc::Receiver<docker_monitor::events::RebuildRequest>,
}

/// Coordinator over a fake engine; not yet initialized.
pub fn harness(engine: FakeEngine) -> Harness {
    let engine = Arc::new(engine);
    let connector = Arc::new(FakeConnector::new(engine.clone()));
    let (coordinator, rebuild_rx) = Coordinator::new(connector.clone(), test_config());
    Harness {
        engine,
        connector,
        coordinator: Arc::new(coordinator),
        rebuild_rx,
    }
}
