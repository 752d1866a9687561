//! Write path: one sample, one write transaction.
//!
//! The payload is encoded before the transaction opens, so the write lock is
//! held only for the table insert and commit. Readers never see a partially
//! written record: they either see the committed insert or nothing.

use redb::{Database, ReadableTable, TableDefinition, TableHandle};
use tracing::debug;

use crate::codec::RecordCodec;
use crate::error::{EngineError, InputError, Result};
use crate::key::{encode_key, now_ns};
use crate::sample::{ProcessMetricSample, Sample};
use crate::schema::{Container, PROCESS_METRICS, SampleTable, service_table_name};

const OP_WRITE: &str = "write";

/// Puts `sample` into a global container, replacing any record at the same
/// timestamp.
pub(crate) fn write_global<S: Sample>(
    db: &Database,
    codec: &RecordCodec,
    definition: SampleTable<'_>,
    sample: &S,
) -> Result<()> {
    let container = definition.name();
    let value = codec.encode(sample)?;
    let key = encode_key(sample.timestamp_ns());

    let txn = db
        .begin_write()
        .map_err(|e| EngineError::new(OP_WRITE, container, e))?;
    {
        let mut table = txn
            .open_table(definition)
            .map_err(|e| EngineError::new(OP_WRITE, container, e))?;
        table
            .insert(key.as_slice(), &*value)
            .map_err(|e| EngineError::new(OP_WRITE, container, e))?;
    }
    txn.commit()
        .map_err(|e| EngineError::new(OP_WRITE, container, e))?;

    Ok(())
}

/// Puts `sample` into its service's sub-container, creating the
/// sub-container on the service's first write.
pub(crate) fn write_process(
    db: &Database,
    codec: &RecordCodec,
    sample: &ProcessMetricSample,
) -> Result<()> {
    let service = sample.service_name.as_str();
    if service.is_empty() {
        return Err(InputError::EmptyServiceName.into());
    }

    let parent = Container::ProcessMetrics.name();
    let table_name = service_table_name(service);
    let value = codec.encode(sample)?;
    let key = encode_key(sample.timestamp_ns);

    let txn = db
        .begin_write()
        .map_err(|e| EngineError::new(OP_WRITE, parent, e))?;
    {
        let mut registry = txn
            .open_table(PROCESS_METRICS)
            .map_err(|e| EngineError::new(OP_WRITE, parent, e))?;
        let registered = registry
            .get(service)
            .map_err(|e| EngineError::new(OP_WRITE, parent, e))?
            .is_some();
        if !registered {
            registry
                .insert(service, now_ns())
                .map_err(|e| EngineError::new(OP_WRITE, parent, e))?;
            debug!(service, "created service sub-container");
        }
    }
    {
        let definition: SampleTable<'_> = TableDefinition::new(&table_name);
        let mut table = txn
            .open_table(definition)
            .map_err(|e| EngineError::new(OP_WRITE, table_name.as_str(), e))?;
        table
            .insert(key.as_slice(), &*value)
            .map_err(|e| EngineError::new(OP_WRITE, table_name.as_str(), e))?;
    }
    txn.commit()
        .map_err(|e| EngineError::new(OP_WRITE, table_name.as_str(), e))?;

    Ok(())
}
