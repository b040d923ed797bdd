// Decode raw Docker stats API responses into RawSample.

use crate::error::EngineError;
use crate::models::{CpuCounters, MemoryCounters, NetCounters, RawSample};
use bollard::models::ContainerStatsResponse;
use chrono::{DateTime, Utc};

/// cgroup v2 key first, then the cgroup v1 equivalent.
const INACTIVE_FILE_KEYS: [&str; 2] = ["inactive_file", "total_inactive_file"];

/// Convert one stats stream item. Missing counters decode as 0; a missing or
/// unparseable read timestamp is a data-shape error.
pub(crate) fn to_raw_sample(s: &ContainerStatsResponse) -> Result<RawSample, EngineError> {
    let read = s
        .read
        .as_deref()
        .ok_or_else(|| EngineError::Malformed("stats sample without read timestamp".into()))
        .and_then(parse_timestamp)?;

    let cpu_stats = s.cpu_stats.as_ref();
    let cpu = CpuCounters {
        container: cpu_stats
            .and_then(|c| c.cpu_usage.as_ref())
            .and_then(|u| u.total_usage)
            .unwrap_or(0),
        system: cpu_stats.and_then(|c| c.system_cpu_usage).unwrap_or(0),
        online_cpus: cpu_stats.and_then(|c| c.online_cpus).unwrap_or(1),
    };

    let mem_stats = s.memory_stats.as_ref();
    let inactive_file = mem_stats
        .and_then(|m| m.stats.as_ref())
        .and_then(|stats| INACTIVE_FILE_KEYS.iter().find_map(|k| stats.get(*k).copied()))
        .unwrap_or(0);
    let memory = MemoryCounters {
        usage: mem_stats.and_then(|m| m.usage).unwrap_or(0),
        limit: mem_stats.and_then(|m| m.limit).unwrap_or(0),
        inactive_file,
    };

    let networks = s
        .networks
        .as_ref()
        .map(|n| {
            n.iter()
                .map(|(name, v)| {
                    (
                        name.clone(),
                        NetCounters {
                            rx_bytes: v.rx_bytes.unwrap_or(0),
                            tx_bytes: v.tx_bytes.unwrap_or(0),
                        },
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(RawSample {
        read,
        cpu,
        memory,
        networks,
    })
}

/// Parse Docker's RFC 3339 timestamps (nanosecond precision, `Z` suffix).
pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, EngineError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| EngineError::Malformed(format!("timestamp {:?}: {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{
        ContainerCpuStats, ContainerCpuUsage, ContainerMemoryStats, ContainerNetworkStats,
        ContainerStatsResponse,
    };
    use chrono::{TimeZone, Timelike};
    use std::collections::HashMap;

    fn minimal_cpu_stats(total_usage: u64, system_cpu_usage: u64) -> ContainerCpuStats {
        ContainerCpuStats {
            cpu_usage: Some(ContainerCpuUsage {
                total_usage: Some(total_usage),
                ..Default::default()
            }),
            system_cpu_usage: Some(system_cpu_usage),
            online_cpus: Some(2),
            ..Default::default()
        }
    }

    #[test]
    fn to_raw_sample_requires_read_timestamp() {
        let s = ContainerStatsResponse {
            cpu_stats: Some(minimal_cpu_stats(100, 1000)),
            ..Default::default()
        };
        let err = to_raw_sample(&s).unwrap_err();
        assert!(matches!(err, EngineError::Malformed(_)));
    }

    #[test]
    fn to_raw_sample_rejects_garbage_timestamp() {
        let s = ContainerStatsResponse {
            read: Some("yesterday".to_string()),
            ..Default::default()
        };
        assert!(to_raw_sample(&s).is_err());
    }

    #[test]
    fn to_raw_sample_decodes_counters() {
        let s = ContainerStatsResponse {
            read: Some("2024-05-01T12:00:30.123456789Z".to_string()),
            cpu_stats: Some(minimal_cpu_stats(100_000_000, 1_000_000_000)),
            memory_stats: Some(ContainerMemoryStats {
                usage: Some(256 * 1024 * 1024),
                limit: Some(512 * 1024 * 1024),
                stats: Some(HashMap::from([("inactive_file".to_string(), 16 * 1024 * 1024)])),
                ..Default::default()
            }),
            networks: Some(HashMap::from([
                (
                    "eth0".to_string(),
                    ContainerNetworkStats {
                        rx_bytes: Some(1000),
                        tx_bytes: Some(2000),
                        ..Default::default()
                    },
                ),
                (
                    "eth1".to_string(),
                    ContainerNetworkStats {
                        rx_bytes: Some(10),
                        ..Default::default()
                    },
                ),
            ])),
            ..Default::default()
        };
        let out = to_raw_sample(&s).unwrap();
        assert_eq!(out.read.timestamp(), Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 30).unwrap().timestamp());
        assert_eq!(out.read.nanosecond(), 123_456_789);
        assert_eq!(out.cpu.container, 100_000_000);
        assert_eq!(out.cpu.system, 1_000_000_000);
        assert_eq!(out.cpu.online_cpus, 2);
        assert_eq!(out.memory.usage, 256 * 1024 * 1024);
        assert_eq!(out.memory.limit, 512 * 1024 * 1024);
        assert_eq!(out.memory.inactive_file, 16 * 1024 * 1024);
        assert_eq!(out.networks["eth0"].rx_bytes, 1000);
        assert_eq!(out.networks["eth0"].tx_bytes, 2000);
        assert_eq!(out.networks["eth1"].tx_bytes, 0);
    }

    #[test]
    fn to_raw_sample_falls_back_to_cgroup_v1_inactive_file() {
        let s = ContainerStatsResponse {
            read: Some("2024-05-01T12:00:30Z".to_string()),
            memory_stats: Some(ContainerMemoryStats {
                usage: Some(1000),
                limit: Some(4000),
                stats: Some(HashMap::from([("total_inactive_file".to_string(), 250)])),
                ..Default::default()
            }),
            ..Default::default()
        };
        let out = to_raw_sample(&s).unwrap();
        assert_eq!(out.memory.inactive_file, 250);
    }

    #[test]
    fn to_raw_sample_defaults_missing_sections() {
        let s = ContainerStatsResponse {
            read: Some("2024-05-01T12:00:30Z".to_string()),
            ..Default::default()
        };
        let out = to_raw_sample(&s).unwrap();
        assert_eq!(out.cpu.container, 0);
        assert_eq!(out.cpu.online_cpus, 1);
        assert_eq!(out.memory.limit, 0);
        assert!(out.networks.is_empty());
    }
}
