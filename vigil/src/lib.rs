//! # vigil
//!
//! Embedded time-series store for supervisor metrics.
//!
//! vigil persists periodic system and per-process measurements in a single
//! file and answers range and latest-value queries over them. Retention is
//! bounded by pruning, which an external scheduler drives.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Single-file storage on [redb](https://docs.rs/redb): one writer, many
//!   snapshot readers, atomic commits
//! - Keys are big-endian nanosecond timestamps, so table order is time order
//! - Range queries are a seek plus a bounded forward scan; latest-value
//!   queries are a tail lookup
//! - One sub-container per supervised service, created on first write
//! - Pruning deletes across every container in one transaction
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use vigil::{ProcessMetricSample, ProcessState, Store, StoreConfig, TimeRange};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StoreConfig::new("./metrics.redb").with_retention(Duration::from_secs(6 * 3600));
//! let store = Store::open(config)?;
//! let cancel = CancellationToken::new();
//!
//! store.write_process_metrics(&cancel, &ProcessMetricSample {
//!     service_name: "api".to_string(),
//!     pid: 4242,
//!     state: ProcessState::Running,
//!     healthy: true,
//!     timestamp_ns: vigil::now_ns(),
//!     ..Default::default()
//! })?;
//!
//! let latest = store.get_latest_process_metrics(&cancel, "api")?;
//! println!("api is {} (pid {})", latest.state, latest.pid);
//!
//! let window = TimeRange::last(Duration::from_secs(600), vigil::now_ns());
//! let history = store.get_process_metrics(&cancel, "api", window)?;
//! println!("{} samples in the last 10m", history.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Store`]: Top-level handle; opens the file, owns the engine
//! - [`StoreConfig`]: Path, retention, prune interval, open timeout
//! - [`MetricsWriter`], [`MetricsReader`], [`MetricsMaintainer`]: Port
//!   traits for the layers that consume the store
//! - [`TimeRange`]: Inclusive query bounds
//!
//! ## Modules
//!
//! - [`store`]: Store lifecycle and the public operations
//! - [`sample`]: The three sample kinds
//! - [`query`]: Query bounds
//! - [`ports`]: Port traits
//! - [`config`]: Store configuration
//! - [`error`]: Error types

mod codec;
pub mod config;
pub mod error;
mod key;
pub mod ports;
mod prune;
pub mod query;
pub mod sample;
mod schema;
pub mod store;
mod write;

// Re-export primary API types at crate root for convenience.
pub use codec::BufferPool;
pub use config::StoreConfig;
pub use error::{
    ConfigError, DecodeError, EncodeError, EngineError, InputError, NotFoundError, Result,
    SchemaError, StoreError, VigilError,
};
pub use key::{now_ns, system_time_from_timestamp, timestamp_from_system_time};
pub use ports::{MetricsMaintainer, MetricsReader, MetricsStore, MetricsWriter};
pub use query::TimeRange;
pub use sample::{
    ProcessCpu, ProcessMemory, ProcessMetricSample, ProcessState, Sample, SystemCpuSample,
    SystemMemorySample,
};
pub use schema::{CURRENT_SCHEMA_VERSION, Container, StoreMetadata};
pub use store::Store;
