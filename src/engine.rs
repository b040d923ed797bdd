// Container engine client abstraction. The Docker implementation lives in docker_repo.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::sync::Arc;

use crate::error::EngineError;
use crate::models::{ContainerRef, RawSample};

/// Live, decoded statistics stream for one container (one sample roughly per second).
pub type SampleStream = BoxStream<'static, Result<RawSample, EngineError>>;

/// Lifecycle event feed, already filtered to container start/stop/create/destroy.
pub type EventStream = BoxStream<'static, Result<LifecycleEvent, EngineError>>;

/// Container lifecycle actions the event feed is filtered to.
pub const LIFECYCLE_ACTIONS: [&str; 4] = ["start", "stop", "create", "destroy"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub action: String,
    /// Container name when the engine reports one, otherwise its id.
    pub container: String,
}

/// Operations the coordinator needs from a connected engine client.
#[async_trait]
pub trait Engine: Send + Sync {
    /// All containers, including stopped ones.
    async fn list_containers(&self) -> Result<Vec<ContainerRef>, EngineError>;

    /// Open a streaming, decoded stats feed. Opening is lazy; I/O starts on first poll.
    fn stats_stream(&self, container: &ContainerRef) -> SampleStream;

    fn events(&self) -> EventStream;

    async fn start(&self, container: &ContainerRef) -> Result<(), EngineError>;

    async fn stop(&self, container: &ContainerRef) -> Result<(), EngineError>;

    async fn restart(&self, container: &ContainerRef) -> Result<(), EngineError>;
}

/// Builds engine clients for a URL; used at startup and for every reconnect.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn Engine>, EngineError>;
}
