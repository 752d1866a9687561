//! Sample types persisted by the store.
//!
//! There are three kinds of sample, each with its own time series:
//!
//! - [`SystemCpuSample`]: aggregate CPU counters, one global series
//! - [`SystemMemorySample`]: aggregate memory counters, one global series
//! - [`ProcessMetricSample`]: per-service snapshot, one series per service
//!
//! All timestamps are nanoseconds since the Unix epoch and keys sort by them.

use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A sample kind the store knows how to key and encode.
///
/// Implemented by the three sample types; not meant for downstream types.
pub trait Sample: Serialize + DeserializeOwned {
    /// Short name used in error messages and logs.
    const KIND: &'static str;

    /// The timestamp this sample is keyed by.
    fn timestamp_ns(&self) -> u64;
}

/// Aggregate CPU time counters, in clock ticks since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemCpuSample {
    /// Time in user mode.
    pub user: u64,
    /// Time in user mode with low priority.
    pub nice: u64,
    /// Time in kernel mode.
    pub system: u64,
    /// Idle time.
    pub idle: u64,
    /// Time waiting for I/O.
    pub iowait: u64,
    /// Time servicing hardware interrupts.
    pub irq: u64,
    /// Time servicing soft interrupts.
    pub softirq: u64,
    /// Time stolen by the hypervisor.
    pub steal: u64,
    /// Time running a guest.
    pub guest: u64,
    /// Time running a niced guest.
    pub guest_nice: u64,
    /// Sample time in nanoseconds since the epoch.
    pub timestamp_ns: u64,
}

impl SystemCpuSample {
    /// Sum of all non-guest counters.
    ///
    /// Guest time is already accounted in `user`/`nice` by the kernel.
    pub fn total(&self) -> u64 {
        self.user
            .saturating_add(self.nice)
            .saturating_add(self.system)
            .saturating_add(self.idle)
            .saturating_add(self.iowait)
            .saturating_add(self.irq)
            .saturating_add(self.softirq)
            .saturating_add(self.steal)
    }

    /// Time spent doing work: total minus idle and iowait.
    pub fn active(&self) -> u64 {
        self.total()
            .saturating_sub(self.idle)
            .saturating_sub(self.iowait)
    }
}

impl Sample for SystemCpuSample {
    const KIND: &'static str = "system_cpu";

    fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }
}

/// Aggregate memory counters, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMemorySample {
    /// Total usable RAM.
    pub total: u64,
    /// Memory available for new workloads without swapping.
    pub available: u64,
    /// Completely unused memory.
    pub free: u64,
    /// Memory in use.
    pub used: u64,
    /// Page cache.
    pub cached: u64,
    /// Block device buffers.
    pub buffers: u64,
    /// Shared memory (tmpfs, shm).
    pub shared: u64,
    /// Total swap space.
    pub swap_total: u64,
    /// Unused swap space.
    pub swap_free: u64,
    /// Sample time in nanoseconds since the epoch.
    pub timestamp_ns: u64,
}

impl SystemMemorySample {
    /// Swap currently in use.
    pub fn swap_used(&self) -> u64 {
        self.swap_total.saturating_sub(self.swap_free)
    }
}

impl Sample for SystemMemorySample {
    const KIND: &'static str = "system_memory";

    fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }
}

/// Lifecycle state of a supervised process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessState {
    /// Not running.
    #[default]
    Stopped,
    /// Spawned, not yet considered up.
    Starting,
    /// Up.
    Running,
    /// Shutdown in progress.
    Stopping,
    /// Exited abnormally and not restarted.
    Failed,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// CPU readings for one process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessCpu {
    /// Time in user mode, in clock ticks.
    pub user: u64,
    /// Time in kernel mode, in clock ticks.
    pub system: u64,
    /// User time of waited-for children.
    pub children_user: u64,
    /// Kernel time of waited-for children.
    pub children_system: u64,
    /// CPU usage over the last sampling interval, 0–100 per core.
    pub usage_percent: f64,
}

/// Memory readings for one process, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessMemory {
    /// Resident set size.
    pub rss: u64,
    /// Virtual memory size.
    pub vms: u64,
    /// Swapped-out memory.
    pub swap: u64,
    /// Shared pages.
    pub shared: u64,
    /// Data segment.
    pub data: u64,
    /// Stack.
    pub stack: u64,
}

/// Point-in-time snapshot of one supervised service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetricSample {
    /// Service the sample belongs to. Selects the sub-container.
    pub service_name: String,
    /// Process ID, 0 when not running.
    pub pid: u32,
    /// Lifecycle state.
    pub state: ProcessState,
    /// Result of the last health check.
    pub healthy: bool,
    /// CPU readings.
    pub cpu: ProcessCpu,
    /// Memory readings.
    pub memory: ProcessMemory,
    /// Process start time in nanoseconds since the epoch, 0 when not running.
    pub start_time_ns: u64,
    /// Time since start.
    pub uptime: Duration,
    /// Restarts performed by the supervisor.
    pub restart_count: u32,
    /// Last failure message, empty if none.
    pub last_error: String,
    /// Sample time in nanoseconds since the epoch.
    pub timestamp_ns: u64,
}

impl Sample for ProcessMetricSample {
    const KIND: &'static str = "process_metrics";

    fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }
}
