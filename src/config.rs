use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::coordinator::CoordinatorConfig;

/// Upper bound for every configured interval or timeout (one day); keeps deadline
/// arithmetic on `Instant` well inside its range.
pub const MAX_DURATION_SECS: u64 = 86_400;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub publishing: PublishingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Docker endpoint, e.g. "unix:///var/run/docker.sock" or "tcp://host:2375".
    pub url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// How long one poll waits for a fresh sample from a container's stats stream.
    #[serde(default = "default_stats_timeout_secs")]
    pub stats_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_stats_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// On-demand refreshes inside this window collapse into one poll.
    #[serde(default = "default_refresh_cooldown_ms")]
    pub refresh_cooldown_ms: u64,
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_refresh_cooldown_ms() -> u64 {
    5000
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            refresh_cooldown_ms: default_refresh_cooldown_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishingConfig {
    /// Max number of datasets kept in the broadcast channel for /ws/containers (slow clients may lag).
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_broadcast_capacity() -> usize {
    16
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.engine.url.trim().is_empty(), "engine.url must be non-empty");
        for (field, secs) in [
            ("engine.request_timeout_secs", self.engine.request_timeout_secs),
            ("engine.connect_timeout_secs", self.engine.connect_timeout_secs),
            ("engine.stats_timeout_secs", self.engine.stats_timeout_secs),
            ("monitoring.poll_interval_secs", self.monitoring.poll_interval_secs),
            ("monitoring.refresh_cooldown_ms", self.monitoring.refresh_cooldown_ms / 1000),
        ] {
            anyhow::ensure!(
                secs <= MAX_DURATION_SECS,
                "{} must be at most {} seconds, got {}",
                field,
                MAX_DURATION_SECS,
                secs
            );
        }
        anyhow::ensure!(
            self.engine.request_timeout_secs > 0,
            "engine.request_timeout_secs must be > 0, got {}",
            self.engine.request_timeout_secs
        );
        anyhow::ensure!(
            self.engine.connect_timeout_secs > 0,
            "engine.connect_timeout_secs must be > 0, got {}",
            self.engine.connect_timeout_secs
        );
        anyhow::ensure!(
            self.engine.stats_timeout_secs > 0,
            "engine.stats_timeout_secs must be > 0, got {}",
            self.engine.stats_timeout_secs
        );
        anyhow::ensure!(
            self.monitoring.poll_interval_secs > 0,
            "monitoring.poll_interval_secs must be > 0, got {}",
            self.monitoring.poll_interval_secs
        );
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.publishing.broadcast_capacity > 0,
            "publishing.broadcast_capacity must be > 0, got {}",
            self.publishing.broadcast_capacity
        );
        Ok(())
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            url: self.engine.url.clone(),
            connect_timeout: Duration::from_secs(self.engine.connect_timeout_secs),
            stats_timeout: Duration::from_secs(self.engine.stats_timeout_secs),
            broadcast_capacity: self.publishing.broadcast_capacity,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.request_timeout_secs)
    }
}
