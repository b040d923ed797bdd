// Counter-to-rate conversion: CPU percentage, memory usage, network throughput.
// Each function takes the current sample and, where needed, the previous poll's
// derived metrics for the same container.

use crate::models::{CpuMetrics, InterfaceMetrics, MemMetrics, NetCounters, NetMetrics, RawSample};
use std::collections::BTreeMap;

/// CPU share of the host over the interval since `prev`, scaled by online CPUs.
/// 0 on the first sample or when either counter did not strictly increase.
pub fn compute_cpu(prev: Option<&CpuMetrics>, sample: &RawSample) -> CpuMetrics {
    let container = sample.cpu.container;
    let system = sample.cpu.system;

    let percentage = match prev {
        Some(prev) if container > prev.container && system > prev.system => {
            let cpu_delta = (container - prev.container) as f64;
            let system_delta = (system - prev.system) as f64;
            (cpu_delta / system_delta) * sample.cpu.online_cpus as f64 * 100.0
        }
        _ => 0.0,
    };

    CpuMetrics {
        container,
        system,
        percentage,
    }
}

/// Instantaneous memory usage excluding reclaimable page cache.
pub fn compute_mem(sample: &RawSample) -> MemMetrics {
    let usage = sample
        .memory
        .usage
        .saturating_sub(sample.memory.inactive_file);
    let max = sample.memory.limit;
    let percentage = if max > 0 {
        (usage as f64 / max as f64) * 100.0
    } else {
        0.0
    };
    MemMetrics {
        usage,
        max,
        percentage,
    }
}

/// Per-interface and aggregate byte counters with speeds over the gap between
/// `prev.last_update` and this sample's read time.
pub fn compute_net(prev: Option<&NetMetrics>, sample: &RawSample) -> NetMetrics {
    let elapsed_secs = prev.map_or(0.0, |p| {
        (sample.read - p.last_update).num_milliseconds() as f64 / 1000.0
    });

    // Aggregate speed is the sum of interface speeds, not a delta of summed counters.
    let mut total = InterfaceMetrics::default();
    let mut interfaces = BTreeMap::new();
    for (name, counters) in &sample.networks {
        let prev_if = prev.and_then(|p| p.interfaces.get(name));
        let metrics = interface(prev_if, counters, elapsed_secs);
        total.rx_bytes += metrics.rx_bytes;
        total.tx_bytes += metrics.tx_bytes;
        total.speed_rx += metrics.speed_rx;
        total.speed_tx += metrics.speed_tx;
        interfaces.insert(name.clone(), metrics);
    }

    NetMetrics {
        interfaces,
        total,
        last_update: sample.read,
    }
}

fn interface(prev: Option<&InterfaceMetrics>, now: &NetCounters, elapsed_secs: f64) -> InterfaceMetrics {
    let (speed_tx, speed_rx) = match prev {
        Some(p) => (
            speed(p.tx_bytes, now.tx_bytes, elapsed_secs),
            speed(p.rx_bytes, now.rx_bytes, elapsed_secs),
        ),
        None => (0.0, 0.0),
    };
    InterfaceMetrics {
        tx_bytes: now.tx_bytes,
        rx_bytes: now.rx_bytes,
        speed_tx,
        speed_rx,
    }
}

/// A counter that went backwards (engine or interface reset) yields 0, never a negative rate.
fn speed(prev: u64, now: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 || now < prev {
        return 0.0;
    }
    (now - prev) as f64 / elapsed_secs
}
