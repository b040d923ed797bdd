// Domain models

mod container;
mod metrics;
mod sample;

pub use container::{ContainerRef, ContainerStatus};
pub use metrics::{CpuMetrics, Dataset, DerivedMetrics, InterfaceMetrics, MemMetrics, NetMetrics};
pub use sample::{CpuCounters, MemoryCounters, NetCounters, RawSample};
