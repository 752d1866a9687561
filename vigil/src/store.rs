//! Store facade: the public handle over one store file.
//!
//! [`Store`] owns the redb [`Database`] and the record codec. Every other
//! module is an internal collaborator reached only through it.
//!
//! # Lifecycle
//!
//! [`Store::open`] creates or opens the file, then runs schema
//! initialization in one write transaction before returning. No other
//! transaction can be issued until `open` returns, so every caller sees the
//! four top-level containers. [`Store::close`] consumes the handle and
//! releases the file lock.
//!
//! # Concurrency
//!
//! `Store` is `Send + Sync`. Share it by reference across collection loops
//! and query callers; the engine serializes writers and gives each reader a
//! snapshot. The store adds no lock of its own.
//!
//! # Cancellation
//!
//! Every data operation takes a [`CancellationToken`] and checks it once, on
//! entry. A cancelled token returns [`VigilError::Cancelled`] before any
//! transaction opens. Once a transaction is open the operation runs to
//! completion.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use vigil::{Store, StoreConfig, SystemCpuSample, TimeRange};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open(StoreConfig::new("./metrics.redb"))?;
//! let cancel = CancellationToken::new();
//!
//! store.write_system_cpu(&cancel, &SystemCpuSample {
//!     user: 1200,
//!     idle: 8800,
//!     timestamp_ns: vigil::now_ns(),
//!     ..Default::default()
//! })?;
//!
//! let last_hour = TimeRange::last(Duration::from_secs(3600), vigil::now_ns());
//! for sample in store.get_system_cpu(&cancel, last_hour)? {
//!     println!("{} active={}", sample.timestamp_ns, sample.active());
//! }
//!
//! let deleted = store.prune_expired(&cancel)?;
//! println!("pruned {deleted} samples");
//! store.close()?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use redb::{Database, DatabaseError, ReadTransaction};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::{BufferPool, RecordCodec};
use crate::config::StoreConfig;
use crate::error::{EngineError, NotFoundError, Result, StoreError, VigilError};
use crate::key::{cutoff_ns, now_ns};
use crate::prune::prune_before;
use crate::query::{TimeRange, latest, range, service_latest, service_range};
use crate::sample::{ProcessMetricSample, SystemCpuSample, SystemMemorySample};
use crate::schema::{
    Container, SYSTEM_CPU, SYSTEM_MEMORY, StoreMetadata, ensure_schema, list_services,
    read_metadata, service_table_name,
};
use crate::write::{write_global, write_process};

/// Pause between attempts to acquire a locked store file.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Permissions for a newly created store file.
#[cfg(unix)]
const STORE_FILE_MODE: u32 = 0o600;

/// Handle to an open metrics store.
pub struct Store {
    db: Database,
    codec: RecordCodec,
    config: StoreConfig,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Opens the store at `config.path`, creating the file if absent.
    ///
    /// If another handle holds the file, retries until `config.open_timeout`
    /// elapses.
    ///
    /// # Errors
    ///
    /// - [`crate::ConfigError::Invalid`] if `config` fails validation
    /// - [`StoreError::FileAccess`] if the file cannot be created or opened
    /// - [`StoreError::LockTimeout`] if the file stays locked
    /// - [`StoreError::Open`] if the file is not a usable store
    /// - [`crate::SchemaError::UnsupportedVersion`] if the store is newer
    ///   than this build
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::open_with_pool(config, BufferPool::default())
    }

    /// Like [`Store::open`], drawing record encoding buffers from `pool`.
    ///
    /// Pass [`BufferPool::disabled`] to allocate a fresh buffer per write.
    pub fn open_with_pool(config: StoreConfig, pool: BufferPool) -> Result<Self> {
        config.validate()?;
        let codec = RecordCodec::new(pool);

        let db = open_database(&config.path, config.open_timeout)?;
        let version = ensure_schema(&db, now_ns())?;
        debug!(path = %config.path.display(), version, "opened store");

        Ok(Self { db, codec, config })
    }

    /// Flushes and releases the store file.
    ///
    /// Every write is durable once its call returns, so closing only drops
    /// the handle and its file lock.
    pub fn close(self) -> Result<()> {
        debug!(path = %self.config.path.display(), "closing store");
        drop(self.db);
        Ok(())
    }

    /// The configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Location of the store file.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Stores a system CPU sample, replacing any sample at the same
    /// timestamp.
    pub fn write_system_cpu(
        &self,
        cancel: &CancellationToken,
        sample: &SystemCpuSample,
    ) -> Result<()> {
        check_cancelled(cancel)?;
        write_global(&self.db, &self.codec, SYSTEM_CPU, sample)
    }

    /// Stores a system memory sample, replacing any sample at the same
    /// timestamp.
    pub fn write_system_memory(
        &self,
        cancel: &CancellationToken,
        sample: &SystemMemorySample,
    ) -> Result<()> {
        check_cancelled(cancel)?;
        write_global(&self.db, &self.codec, SYSTEM_MEMORY, sample)
    }

    /// Stores a process sample under its service, registering the service
    /// on first write.
    ///
    /// # Errors
    ///
    /// Returns [`crate::InputError::EmptyServiceName`] if the sample has no
    /// service name.
    pub fn write_process_metrics(
        &self,
        cancel: &CancellationToken,
        sample: &ProcessMetricSample,
    ) -> Result<()> {
        check_cancelled(cancel)?;
        write_process(&self.db, &self.codec, sample)
    }

    /// System CPU samples in `time_range`, ascending. No data is an empty
    /// list.
    pub fn get_system_cpu(
        &self,
        cancel: &CancellationToken,
        time_range: TimeRange,
    ) -> Result<Vec<SystemCpuSample>> {
        check_cancelled(cancel)?;
        let txn = self.begin_read("get_system_cpu", Container::SystemCpu.name())?;
        range(&txn, &self.codec, SYSTEM_CPU, time_range)
    }

    /// System memory samples in `time_range`, ascending. No data is an
    /// empty list.
    pub fn get_system_memory(
        &self,
        cancel: &CancellationToken,
        time_range: TimeRange,
    ) -> Result<Vec<SystemMemorySample>> {
        check_cancelled(cancel)?;
        let txn = self.begin_read("get_system_memory", Container::SystemMemory.name())?;
        range(&txn, &self.codec, SYSTEM_MEMORY, time_range)
    }

    /// `service`'s samples in `time_range`, ascending. An unknown service is
    /// an empty list.
    pub fn get_process_metrics(
        &self,
        cancel: &CancellationToken,
        service: &str,
        time_range: TimeRange,
    ) -> Result<Vec<ProcessMetricSample>> {
        check_cancelled(cancel)?;
        let txn = self.begin_read("get_process_metrics", Container::ProcessMetrics.name())?;
        service_range(&txn, &self.codec, service, time_range)
    }

    /// The most recent system CPU sample.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError`] if no CPU sample has been stored.
    pub fn get_latest_system_cpu(&self, cancel: &CancellationToken) -> Result<SystemCpuSample> {
        check_cancelled(cancel)?;
        let container = Container::SystemCpu.name();
        let txn = self.begin_read("get_latest_system_cpu", container)?;
        latest(&txn, &self.codec, SYSTEM_CPU)?.ok_or_else(|| not_found(container))
    }

    /// The most recent system memory sample.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError`] if no memory sample has been stored.
    pub fn get_latest_system_memory(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SystemMemorySample> {
        check_cancelled(cancel)?;
        let container = Container::SystemMemory.name();
        let txn = self.begin_read("get_latest_system_memory", container)?;
        latest(&txn, &self.codec, SYSTEM_MEMORY)?.ok_or_else(|| not_found(container))
    }

    /// The most recent sample for `service`.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError`] naming the service's sub-container if the
    /// service has no samples.
    pub fn get_latest_process_metrics(
        &self,
        cancel: &CancellationToken,
        service: &str,
    ) -> Result<ProcessMetricSample> {
        check_cancelled(cancel)?;
        let txn = self.begin_read("get_latest_process_metrics", Container::ProcessMetrics.name())?;
        service_latest(&txn, &self.codec, service)?
            .ok_or_else(|| not_found(service_table_name(service)))
    }

    /// Deletes every sample older than `older_than` before now, across all
    /// containers, in one transaction. Returns the number deleted.
    ///
    /// A sample exactly `older_than` old is kept.
    pub fn prune(&self, cancel: &CancellationToken, older_than: Duration) -> Result<usize> {
        check_cancelled(cancel)?;
        let now = now_ns();
        prune_before(&self.db, cutoff_ns(now, older_than), now)
    }

    /// [`Store::prune`] with the configured retention.
    pub fn prune_expired(&self, cancel: &CancellationToken) -> Result<usize> {
        self.prune(cancel, self.config.retention)
    }

    /// Schema version, creation time, and last prune time.
    pub fn metadata(&self, cancel: &CancellationToken) -> Result<StoreMetadata> {
        check_cancelled(cancel)?;
        let txn = self.begin_read("metadata", Container::Metadata.name())?;
        read_metadata(&txn)
    }

    /// Names of every service with a sub-container, ascending.
    pub fn list_services(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        check_cancelled(cancel)?;
        let txn = self.begin_read("list_services", Container::ProcessMetrics.name())?;
        list_services(&txn)
    }

    fn begin_read(&self, operation: &'static str, container: &str) -> Result<ReadTransaction> {
        Ok(self
            .db
            .begin_read()
            .map_err(|e| EngineError::new(operation, container, e))?)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(VigilError::Cancelled);
    }
    Ok(())
}

fn not_found(container: impl Into<String>) -> VigilError {
    NotFoundError {
        container: container.into(),
    }
    .into()
}

/// Opens the store file with owner-only permissions, creating it if absent.
fn open_file(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(STORE_FILE_MODE);
    }

    Ok(options.open(path).map_err(|source| StoreError::FileAccess {
        path: path.display().to_string(),
        source,
    })?)
}

/// Opens the database, retrying while another handle holds the file lock.
fn open_database(path: &Path, timeout: Duration) -> Result<Database> {
    let deadline = Instant::now().checked_add(timeout);
    let mut attempts: u32 = 0;

    loop {
        let file = open_file(path)?;
        match redb::Builder::new().create_file(file) {
            Ok(db) => return Ok(db),
            Err(DatabaseError::DatabaseAlreadyOpen) => {
                attempts += 1;
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return Err(StoreError::LockTimeout {
                        path: path.display().to_string(),
                        timeout,
                    }
                    .into());
                }
                if attempts == 1 {
                    warn!(path = %path.display(), ?timeout, "store file locked, waiting");
                } else {
                    debug!(path = %path.display(), attempts, "store file still locked");
                }
                thread::sleep(LOCK_RETRY_INTERVAL);
            }
            Err(source) => {
                return Err(StoreError::Open {
                    path: path.display().to_string(),
                    source,
                }
                .into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CURRENT_SCHEMA_VERSION;
    use tempfile::tempdir;

    fn config_in(dir: &tempfile::TempDir) -> StoreConfig {
        StoreConfig::new(dir.path().join("store.redb"))
    }

    #[test]
    fn test_open_creates_file() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir);
        let store = Store::open(config.clone()).unwrap();

        assert!(config.path.exists());
        assert_eq!(store.path(), config.path);

        let meta = store.metadata(&CancellationToken::new()).unwrap();
        assert_eq!(meta.version, CURRENT_SCHEMA_VERSION);
        assert!(meta.created_ns > 0);
        store.close().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let config = config_in(&dir);
        Store::open(config.clone()).unwrap().close().unwrap();

        let mode = std::fs::metadata(&config.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir).with_retention(Duration::ZERO);

        let err = Store::open(config.clone()).unwrap_err();
        assert!(matches!(err, VigilError::Config(_)));
        assert!(!config.path.exists());
    }

    #[test]
    fn test_second_handle_times_out() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir).with_open_timeout(Duration::from_millis(120));
        let _held = Store::open(config.clone()).unwrap();

        let started = Instant::now();
        let err = Store::open(config).unwrap_err();
        assert!(matches!(
            err,
            VigilError::Store(StoreError::LockTimeout { .. })
        ));
        assert!(started.elapsed() >= Duration::from_millis(120));
    }

    #[test]
    fn test_reopen_after_close() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir).with_open_timeout(Duration::ZERO);

        Store::open(config.clone()).unwrap().close().unwrap();
        Store::open(config).unwrap().close().unwrap();
    }

    #[test]
    fn test_open_with_unpooled_buffers() {
        let dir = tempdir().unwrap();
        let store = Store::open_with_pool(config_in(&dir), BufferPool::disabled()).unwrap();
        let cancel = CancellationToken::new();

        for ts in [10, 20] {
            let sample = SystemCpuSample {
                user: ts,
                timestamp_ns: ts,
                ..Default::default()
            };
            store.write_system_cpu(&cancel, &sample).unwrap();
        }

        let samples = store.get_system_cpu(&cancel, TimeRange::all()).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(store.get_latest_system_cpu(&cancel).unwrap().user, 20);
    }

    #[test]
    fn test_cancelled_token_short_circuits() {
        let dir = tempdir().unwrap();
        let store = Store::open(config_in(&dir)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let sample = SystemCpuSample {
            timestamp_ns: 1,
            ..Default::default()
        };
        assert!(store.write_system_cpu(&cancel, &sample).unwrap_err().is_cancelled());
        assert!(store.get_latest_system_cpu(&cancel).unwrap_err().is_cancelled());
        assert!(store.prune(&cancel, Duration::ZERO).unwrap_err().is_cancelled());

        let live = CancellationToken::new();
        assert!(store.get_system_cpu(&live, TimeRange::all()).unwrap().is_empty());
        assert_eq!(store.metadata(&live).unwrap().last_prune_ns, None);
    }

    #[test]
    fn test_latest_not_found_names_container() {
        let dir = tempdir().unwrap();
        let store = Store::open(config_in(&dir)).unwrap();
        let cancel = CancellationToken::new();

        let err = store.get_latest_system_memory(&cancel).unwrap_err();
        assert!(matches!(
            &err,
            VigilError::NotFound(NotFoundError { container }) if container == "system_memory"
        ));

        let err = store.get_latest_process_metrics(&cancel, "db").unwrap_err();
        assert!(matches!(
            &err,
            VigilError::NotFound(NotFoundError { container }) if container == "process_metrics/db"
        ));
    }

    #[test]
    fn test_store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Store>();
    }
}
