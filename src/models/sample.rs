// Raw per-container statistics snapshot, decoded from the engine's stats stream

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuCounters {
    /// Cumulative CPU time used by the container (ns).
    pub container: u64,
    /// Cumulative host CPU time (ns).
    pub system: u64,
    pub online_cpus: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryCounters {
    pub usage: u64,
    pub limit: u64,
    /// Reclaimable page cache, subtracted from usage.
    pub inactive_file: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub read: DateTime<Utc>,
    pub cpu: CpuCounters,
    pub memory: MemoryCounters,
    pub networks: BTreeMap<String, NetCounters>,
}
