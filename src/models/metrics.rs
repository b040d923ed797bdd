// Derived metrics published once per poll cycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ContainerStatus;

/// Published dataset: container name -> metrics. Also the "previous" state of the next poll.
pub type Dataset = BTreeMap<String, DerivedMetrics>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuMetrics {
    pub container: u64,
    pub system: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemMetrics {
    pub usage: u64,
    pub max: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InterfaceMetrics {
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    /// Bytes per second; 0 without a usable previous sample.
    pub speed_tx: f64,
    pub speed_rx: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetMetrics {
    pub interfaces: BTreeMap<String, InterfaceMetrics>,
    pub total: InterfaceMetrics,
    pub last_update: DateTime<Utc>,
}

/// Metrics for one container. cpu/mem/net are only present for running containers
/// that produced a fresh sample this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics {
    pub id: String,
    pub status: ContainerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem: Option<MemMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net: Option<NetMetrics>,
}
