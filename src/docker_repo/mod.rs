// Docker engine client via bollard

mod stats;

use crate::engine::{Connector, Engine, EventStream, LIFECYCLE_ACTIONS, LifecycleEvent, SampleStream};
use crate::error::EngineError;
use crate::models::{ContainerRef, ContainerStatus};
use async_trait::async_trait;
use bollard::query_parameters::{
    EventsOptions, InspectContainerOptions, ListContainersOptions, RestartContainerOptions,
    StartContainerOptions, StatsOptions, StopContainerOptions,
};
use bollard::models::{ContainerSummary, EventMessage};
use bollard::{API_DEFAULT_VERSION, Docker};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use stats::parse_timestamp;

impl From<bollard::errors::Error> for EngineError {
    fn from(e: bollard::errors::Error) -> Self {
        use bollard::errors::Error;
        match e {
            Error::DockerResponseServerError {
                status_code,
                message,
            } => EngineError::Api {
                status: status_code,
                message,
            },
            Error::JsonDataError { .. } | Error::JsonSerdeError { .. } => {
                EngineError::Malformed(e.to_string())
            }
            other => EngineError::Connection(other.to_string()),
        }
    }
}

pub struct DockerRepo {
    docker: Docker,
}

impl DockerRepo {
    /// Build a client for `url` (`unix://`, `tcp://`, `http://`, or empty for local
    /// defaults) and verify the daemon answers a ping.
    pub async fn connect(url: &str, request_timeout: Duration) -> Result<Self, EngineError> {
        let docker = open(url, request_timeout)?;
        docker.ping().await?;
        Ok(Self { docker })
    }

    /// Inspect for status and start time; `None` if the container vanished since listing.
    async fn describe(&self, summary: &ContainerSummary) -> Result<Option<ContainerRef>, EngineError> {
        let Some(id) = summary.id.clone() else {
            return Ok(None);
        };
        let inspect = match self
            .docker
            .inspect_container(&id, None::<InspectContainerOptions>)
            .await
        {
            Ok(i) => i,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                debug!(container = %id, "container vanished before inspect");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let name = summary
            .names
            .as_ref()
            .and_then(|n| n.first())
            .cloned()
            .or(inspect.name.clone())
            .unwrap_or_else(|| id.clone());
        let name = name.trim_start_matches('/').to_string();

        let state = inspect.state.as_ref();
        let status = state
            .and_then(|s| s.status.as_ref())
            .map(|s| ContainerStatus::from_docker(&s.to_string()))
            .unwrap_or(ContainerStatus::Unknown);
        let started_at = if status.is_running() {
            state
                .and_then(|s| s.started_at.as_deref())
                .and_then(|s| parse_timestamp(s).ok())
        } else {
            None
        };

        Ok(Some(ContainerRef {
            id,
            name,
            status,
            started_at,
        }))
    }
}

fn open(url: &str, request_timeout: Duration) -> Result<Docker, EngineError> {
    let timeout_secs = request_timeout.as_secs();
    let docker = if url.is_empty() {
        Docker::connect_with_local_defaults().map(|d| d.with_timeout(request_timeout))
    } else if url.starts_with("unix://") {
        #[cfg(unix)]
        {
            Docker::connect_with_unix(url, timeout_secs, API_DEFAULT_VERSION)
        }
        #[cfg(not(unix))]
        {
            return Err(EngineError::Connection(format!(
                "unix sockets are not supported on this platform: {}",
                url
            )));
        }
    } else {
        Docker::connect_with_http(url, timeout_secs, API_DEFAULT_VERSION)
    };
    Ok(docker?)
}

fn lifecycle_event(msg: EventMessage) -> Option<LifecycleEvent> {
    let action = msg.action?;
    let actor = msg.actor?;
    let container = actor
        .attributes
        .as_ref()
        .and_then(|a| a.get("name").cloned())
        .or(actor.id)?;
    Some(LifecycleEvent { action, container })
}

#[async_trait]
impl Engine for DockerRepo {
    #[instrument(skip(self), fields(repo = "docker", operation = "list_containers"))]
    async fn list_containers(&self) -> Result<Vec<ContainerRef>, EngineError> {
        let options = ListContainersOptions {
            all: true,
            ..Default::default()
        };
        let summaries = self.docker.list_containers(Some(options)).await?;

        let mut containers = Vec::with_capacity(summaries.len());
        for summary in &summaries {
            if let Some(c) = self.describe(summary).await? {
                containers.push(c);
            }
        }
        Ok(containers)
    }

    fn stats_stream(&self, container: &ContainerRef) -> SampleStream {
        let options = StatsOptions {
            stream: true,
            ..Default::default()
        };
        self.docker
            .stats(&container.id, Some(options))
            .map(|item| match item {
                Ok(s) => stats::to_raw_sample(&s),
                Err(e) => Err(EngineError::from(e)),
            })
            .boxed()
    }

    fn events(&self) -> EventStream {
        let filters = HashMap::from([
            ("type".to_string(), vec!["container".to_string()]),
            (
                "event".to_string(),
                LIFECYCLE_ACTIONS.iter().map(|a| a.to_string()).collect(),
            ),
        ]);
        let options = EventsOptions {
            filters: Some(filters),
            ..Default::default()
        };
        self.docker
            .events(Some(options))
            .filter_map(|item| async move {
                match item {
                    Ok(msg) => {
                        let event = lifecycle_event(msg);
                        if event.is_none() {
                            warn!("ignoring event without action or actor");
                        }
                        event.map(Ok)
                    }
                    Err(e) => Some(Err(EngineError::from(e))),
                }
            })
            .boxed()
    }

    #[instrument(skip(self, container), fields(repo = "docker", operation = "start", container = %container.name))]
    async fn start(&self, container: &ContainerRef) -> Result<(), EngineError> {
        self.docker
            .start_container(&container.id, None::<StartContainerOptions>)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, container), fields(repo = "docker", operation = "stop", container = %container.name))]
    async fn stop(&self, container: &ContainerRef) -> Result<(), EngineError> {
        self.docker
            .stop_container(&container.id, None::<StopContainerOptions>)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, container), fields(repo = "docker", operation = "restart", container = %container.name))]
    async fn restart(&self, container: &ContainerRef) -> Result<(), EngineError> {
        self.docker
            .restart_container(&container.id, None::<RestartContainerOptions>)
            .await?;
        Ok(())
    }
}

/// Connects to a Docker daemon; each call yields a fresh client.
pub struct DockerConnector {
    request_timeout: Duration,
}

impl DockerConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl Connector for DockerConnector {
    #[instrument(skip(self), fields(repo = "docker", operation = "connect"))]
    async fn connect(&self, url: &str) -> Result<Arc<dyn Engine>, EngineError> {
        let repo = DockerRepo::connect(url, self.request_timeout).await?;
        Ok(Arc::new(repo))
    }
}
