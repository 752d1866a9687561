//! Retention: deleting samples older than a cutoff.
//!
//! A prune is one write transaction over every sample container: both
//! system containers and every service sub-container listed in
//! `process_metrics`. It commits as a whole or not at all. `metadata` is
//! never pruned; the prune stamps `last_prune` there instead.
//!
//! Each container is pruned in two passes. The first walks the keys below
//! the cutoff and copies them out; the second deletes the copies. Deleting
//! while the range iterator is live is not allowed.
//!
//! The cutoff itself is exclusive: a sample whose timestamp equals the
//! cutoff is kept.

use redb::{Database, ReadableTable, Table, TableDefinition, TableHandle};
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::key::{TimeKey, encode_key};
use crate::schema::{
    Container, KEY_LAST_PRUNE, METADATA, PROCESS_METRICS, SYSTEM_CPU, SYSTEM_MEMORY, SampleTable,
    registered_services, service_table_name,
};

const OP_PRUNE: &str = "prune";

/// Container label for failures of the prune transaction as a whole.
const ALL_CONTAINERS: &str = "all containers";

fn transaction_error(source: impl Into<redb::Error>) -> EngineError {
    EngineError::new(OP_PRUNE, ALL_CONTAINERS, source)
}

/// Deletes every sample with a timestamp strictly below `cutoff_ns` and
/// records `pruned_at_ns` as the last prune time. Returns the number of
/// samples deleted.
pub(crate) fn prune_before(db: &Database, cutoff_ns: u64, pruned_at_ns: u64) -> Result<usize> {
    let cutoff_key = encode_key(cutoff_ns);
    let txn = db.begin_write().map_err(transaction_error)?;

    let mut deleted = 0;
    for definition in [SYSTEM_CPU, SYSTEM_MEMORY] {
        let container = definition.name();
        let mut table = txn
            .open_table(definition)
            .map_err(|e| EngineError::new(OP_PRUNE, container, e))?;
        deleted += prune_table(&mut table, &cutoff_key, container)?;
    }

    let services = {
        let registry = txn
            .open_table(PROCESS_METRICS)
            .map_err(|e| EngineError::new(OP_PRUNE, Container::ProcessMetrics.name(), e))?;
        registered_services(&registry, OP_PRUNE)?
    };

    for service in &services {
        let table_name = service_table_name(service);
        let definition: SampleTable<'_> = TableDefinition::new(&table_name);
        let mut table = txn
            .open_table(definition)
            .map_err(|e| EngineError::new(OP_PRUNE, table_name.as_str(), e))?;
        let removed = prune_table(&mut table, &cutoff_key, &table_name)?;
        if removed > 0 {
            debug!(service = service.as_str(), removed, "pruned service samples");
        }
        deleted += removed;
    }

    let meta_name = Container::Metadata.name();
    {
        let mut meta = txn
            .open_table(METADATA)
            .map_err(|e| EngineError::new(OP_PRUNE, meta_name, e))?;
        meta.insert(KEY_LAST_PRUNE, pruned_at_ns)
            .map_err(|e| EngineError::new(OP_PRUNE, meta_name, e))?;
    }

    txn.commit().map_err(transaction_error)?;

    info!(
        deleted,
        cutoff_ns,
        services = services.len(),
        "pruned expired samples"
    );
    Ok(deleted)
}

/// Two-pass delete of every key below `cutoff_key` in one container.
fn prune_table(
    table: &mut Table<'_, &'static [u8], &'static [u8]>,
    cutoff_key: &TimeKey,
    container: &str,
) -> Result<usize> {
    let mut expired: Vec<Vec<u8>> = Vec::new();
    for entry in table
        .range(..cutoff_key.as_slice())
        .map_err(|e| EngineError::new(OP_PRUNE, container, e))?
    {
        let (key, _) = entry.map_err(|e| EngineError::new(OP_PRUNE, container, e))?;
        expired.push(key.value().to_vec());
    }

    for key in &expired {
        table
            .remove(key.as_slice())
            .map_err(|e| EngineError::new(OP_PRUNE, container, e))?;
    }

    Ok(expired.len())
}
