//! Container layout and schema initialization.
//!
//! A store file holds four top-level containers, each a redb table:
//!
//! ```text
//! system_cpu            [u8; 8] key -> SystemCpuSample payload
//! system_memory         [u8; 8] key -> SystemMemorySample payload
//! process_metrics       service name -> sub-container creation time (ns)
//! metadata              "version" | "created" | "last_prune" -> u64
//! ```
//!
//! `process_metrics` is the parent of one sub-container per service, stored
//! as its own table named `process_metrics/<service>` with the same key and
//! value layout as the system containers. A service's entry in the parent
//! and its sub-container are created together, in the first write
//! transaction for that service, and neither is ever removed by the store.

use std::fmt;

use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, TableHandle};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, Result, SchemaError};

/// Schema version stamped into new stores.
pub const CURRENT_SCHEMA_VERSION: u64 = 1;

/// Table layout shared by every sample container.
pub(crate) type SampleTable<'a> = TableDefinition<'a, &'static [u8], &'static [u8]>;

pub(crate) const SYSTEM_CPU: SampleTable<'static> = TableDefinition::new("system_cpu");
pub(crate) const SYSTEM_MEMORY: SampleTable<'static> = TableDefinition::new("system_memory");
pub(crate) const PROCESS_METRICS: TableDefinition<'static, &'static str, u64> =
    TableDefinition::new("process_metrics");
pub(crate) const METADATA: TableDefinition<'static, &'static str, u64> =
    TableDefinition::new("metadata");

pub(crate) const KEY_VERSION: &str = "version";
pub(crate) const KEY_CREATED: &str = "created";
pub(crate) const KEY_LAST_PRUNE: &str = "last_prune";

/// Separates the parent container name from the service name in
/// sub-container table names.
const SERVICE_TABLE_SEPARATOR: char = '/';

/// The top-level containers of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    /// Global CPU series.
    SystemCpu,
    /// Global memory series.
    SystemMemory,
    /// Parent of the per-service sub-containers.
    ProcessMetrics,
    /// Store metadata. Never pruned.
    Metadata,
}

impl Container {
    /// All top-level containers, in creation order.
    pub const ALL: [Self; 4] = [
        Self::SystemCpu,
        Self::SystemMemory,
        Self::ProcessMetrics,
        Self::Metadata,
    ];

    /// The table name of this container.
    pub fn name(self) -> &'static str {
        match self {
            Self::SystemCpu => "system_cpu",
            Self::SystemMemory => "system_memory",
            Self::ProcessMetrics => "process_metrics",
            Self::Metadata => "metadata",
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Table name of the sub-container holding `service`'s samples.
pub(crate) fn service_table_name(service: &str) -> String {
    format!(
        "{}{SERVICE_TABLE_SEPARATOR}{service}",
        Container::ProcessMetrics.name()
    )
}

/// Persisted store metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Schema version the store was created with.
    pub version: u64,
    /// Store creation time in nanoseconds since the epoch.
    pub created_ns: u64,
    /// Time of the last successful prune, if any.
    pub last_prune_ns: Option<u64>,
}

/// Creates any missing top-level container and stamps first-use metadata.
///
/// Runs in a single write transaction. On a fresh file it records
/// `created = now_ns` and `version = CURRENT_SCHEMA_VERSION`; on an existing
/// store both are left untouched. Returns the store's schema version.
///
/// # Errors
///
/// Returns an engine error if any container cannot be created, or
/// [`SchemaError::UnsupportedVersion`] if the store is newer than this
/// build. Either way nothing is committed.
pub(crate) fn ensure_schema(db: &Database, now_ns: u64) -> Result<u64> {
    const OP: &str = "ensure_schema";
    let meta_name = Container::Metadata.name();

    let txn = db
        .begin_write()
        .map_err(|e| EngineError::new(OP, meta_name, e))?;

    for definition in [SYSTEM_CPU, SYSTEM_MEMORY] {
        txn.open_table(definition)
            .map_err(|e| EngineError::new(OP, definition.name(), e))?;
    }
    txn.open_table(PROCESS_METRICS)
        .map_err(|e| EngineError::new(OP, Container::ProcessMetrics.name(), e))?;

    let version = {
        let mut meta = txn
            .open_table(METADATA)
            .map_err(|e| EngineError::new(OP, meta_name, e))?;

        let created = meta
            .get(KEY_CREATED)
            .map_err(|e| EngineError::new(OP, meta_name, e))?
            .map(|guard| guard.value());

        if created.is_none() {
            meta.insert(KEY_CREATED, now_ns)
                .map_err(|e| EngineError::new(OP, meta_name, e))?;
            meta.insert(KEY_VERSION, CURRENT_SCHEMA_VERSION)
                .map_err(|e| EngineError::new(OP, meta_name, e))?;
            debug!(version = CURRENT_SCHEMA_VERSION, "initialized new store");
            CURRENT_SCHEMA_VERSION
        } else {
            meta.get(KEY_VERSION)
                .map_err(|e| EngineError::new(OP, meta_name, e))?
                .map_or(CURRENT_SCHEMA_VERSION, |guard| guard.value())
        }
    };

    // Dropping the uncommitted transaction aborts it.
    if version > CURRENT_SCHEMA_VERSION {
        return Err(SchemaError::UnsupportedVersion {
            found: version,
            supported: CURRENT_SCHEMA_VERSION,
        }
        .into());
    }

    txn.commit().map_err(|e| EngineError::new(OP, meta_name, e))?;
    Ok(version)
}

/// Reads the `metadata` container.
pub(crate) fn read_metadata(txn: &ReadTransaction) -> Result<StoreMetadata> {
    const OP: &str = "read_metadata";
    let meta_name = Container::Metadata.name();

    let meta = txn
        .open_table(METADATA)
        .map_err(|e| EngineError::new(OP, meta_name, e))?;
    let read = |key: &str| -> Result<Option<u64>> {
        Ok(meta
            .get(key)
            .map_err(|e| EngineError::new(OP, meta_name, e))?
            .map(|guard| guard.value()))
    };

    Ok(StoreMetadata {
        version: read(KEY_VERSION)?.unwrap_or(CURRENT_SCHEMA_VERSION),
        created_ns: read(KEY_CREATED)?.unwrap_or_default(),
        last_prune_ns: read(KEY_LAST_PRUNE)?,
    })
}

/// Whether `service` has a sub-container, as seen by `txn`.
pub(crate) fn service_exists(
    txn: &ReadTransaction,
    service: &str,
    op: &'static str,
) -> Result<bool> {
    let parent = Container::ProcessMetrics.name();
    let registry = txn
        .open_table(PROCESS_METRICS)
        .map_err(|e| EngineError::new(op, parent, e))?;
    let found = registry
        .get(service)
        .map_err(|e| EngineError::new(op, parent, e))?
        .is_some();
    Ok(found)
}

/// Lists every service with a sub-container, ascending by name.
pub(crate) fn list_services(txn: &ReadTransaction) -> Result<Vec<String>> {
    const OP: &str = "list_services";

    let registry = txn
        .open_table(PROCESS_METRICS)
        .map_err(|e| EngineError::new(OP, Container::ProcessMetrics.name(), e))?;
    registered_services(&registry, OP)
}

/// Names in the service registry, ascending. Works on both the read-only
/// and the writable registry table.
pub(crate) fn registered_services<T>(registry: &T, op: &'static str) -> Result<Vec<String>>
where
    T: ReadableTable<&'static str, u64>,
{
    let parent = Container::ProcessMetrics.name();

    let mut services = Vec::new();
    for entry in registry.iter().map_err(|e| EngineError::new(op, parent, e))? {
        let (name, _) = entry.map_err(|e| EngineError::new(op, parent, e))?;
        services.push(name.value().to_string());
    }
    Ok(services)
}
