// Container registry: one immutable snapshot of containers and their open stats streams.
// The coordinator swaps whole snapshots; a poll keeps the Arc it started with, so a
// concurrent rebuild is never observed half-done. Old streams close when the last
// holder of the old snapshot drops it.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::engine::{Engine, SampleStream};
use crate::error::EngineError;
use crate::models::ContainerRef;

pub type SharedStream = Arc<Mutex<SampleStream>>;

#[derive(Default)]
pub struct Registry {
    containers: Vec<ContainerRef>,
    streams: HashMap<String, SharedStream>,
}

impl Registry {
    /// Enumerate all containers and open a stats stream for each running one.
    /// Streams of non-running containers would never be read.
    pub async fn build(engine: &dyn Engine) -> Result<Self, EngineError> {
        let containers = engine.list_containers().await?;
        let streams = containers
            .iter()
            .filter(|c| c.status.is_running())
            .map(|c| (c.name.clone(), Arc::new(Mutex::new(engine.stats_stream(c)))))
            .collect();
        Ok(Self {
            containers,
            streams,
        })
    }

    pub fn containers(&self) -> &[ContainerRef] {
        &self.containers
    }

    pub fn find(&self, name: &str) -> Option<&ContainerRef> {
        self.containers.iter().find(|c| c.name == name)
    }

    pub fn stream(&self, name: &str) -> Option<SharedStream> {
        self.streams.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}
