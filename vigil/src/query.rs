//! Read path: range scans and latest-value lookups.
//!
//! Both query shapes run inside a caller-provided read transaction, which is
//! a snapshot: writers committing during a scan are invisible to it, and the
//! scan never blocks them.
//!
//! - **Range**: seek to the first key `>= since`, walk forward while the key
//!   is `<= until`. Both bounds are inclusive; `since > until` is an empty
//!   result, not an error.
//! - **Latest**: read the last key of the container. This is a tail lookup
//!   in the B-tree, not a scan.
//!
//! A record that fails to decode aborts the whole query with
//! [`crate::VigilError::Decode`]. Partial results are never returned.

use redb::{ReadTransaction, ReadableTable, TableDefinition, TableError, TableHandle};

use crate::codec::RecordCodec;
use crate::error::{EngineError, Result};
use crate::key::encode_key;
use crate::sample::Sample;
use crate::schema::{SampleTable, service_exists, service_table_name};

const OP_RANGE: &str = "range";
const OP_LATEST: &str = "latest";

/// Inclusive time range in nanoseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// First timestamp included.
    pub since_ns: u64,
    /// Last timestamp included.
    pub until_ns: u64,
}

impl TimeRange {
    /// Creates a range covering `since_ns..=until_ns`.
    pub fn new(since_ns: u64, until_ns: u64) -> Self {
        Self { since_ns, until_ns }
    }

    /// The range covering every representable timestamp.
    pub fn all() -> Self {
        Self::new(0, u64::MAX)
    }

    /// The `window` ending at `now_ns`, saturating at the epoch.
    pub fn last(window: std::time::Duration, now_ns: u64) -> Self {
        Self::new(crate::key::cutoff_ns(now_ns, window), now_ns)
    }

    /// Whether the range contains no timestamps.
    pub fn is_empty(&self) -> bool {
        self.since_ns > self.until_ns
    }

    /// Whether `timestamp_ns` falls inside the range.
    pub fn contains(&self, timestamp_ns: u64) -> bool {
        self.since_ns <= timestamp_ns && timestamp_ns <= self.until_ns
    }
}

/// Collects every sample in `definition` whose key falls in `time_range`,
/// ascending by timestamp.
///
/// A container that does not exist yields an empty list.
pub(crate) fn range<S: Sample>(
    txn: &ReadTransaction,
    codec: &RecordCodec,
    definition: SampleTable<'_>,
    time_range: TimeRange,
) -> Result<Vec<S>> {
    if time_range.is_empty() {
        return Ok(Vec::new());
    }

    let container = definition.name();
    let table = match txn.open_table(definition) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
        Err(e) => return Err(EngineError::new(OP_RANGE, container, e).into()),
    };

    let since_key = encode_key(time_range.since_ns);
    let until_key = encode_key(time_range.until_ns);

    let mut samples = Vec::new();
    let entries = table
        .range(since_key.as_slice()..=until_key.as_slice())
        .map_err(|e| EngineError::new(OP_RANGE, container, e))?;
    for entry in entries {
        let (_, value) = entry.map_err(|e| EngineError::new(OP_RANGE, container, e))?;
        samples.push(codec.decode::<S>(value.value())?);
    }

    Ok(samples)
}

/// Returns the most recent sample in `definition`, or `None` if the
/// container is empty or absent.
pub(crate) fn latest<S: Sample>(
    txn: &ReadTransaction,
    codec: &RecordCodec,
    definition: SampleTable<'_>,
) -> Result<Option<S>> {
    let container = definition.name();
    let table = match txn.open_table(definition) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => return Ok(None),
        Err(e) => return Err(EngineError::new(OP_LATEST, container, e).into()),
    };

    let Some((_, value)) = table
        .last()
        .map_err(|e| EngineError::new(OP_LATEST, container, e))?
    else {
        return Ok(None);
    };

    codec.decode::<S>(value.value()).map(Some)
}

/// [`range`] over a service's sub-container. An unseen service yields an
/// empty list.
pub(crate) fn service_range<S: Sample>(
    txn: &ReadTransaction,
    codec: &RecordCodec,
    service: &str,
    time_range: TimeRange,
) -> Result<Vec<S>> {
    if !service_exists(txn, service, OP_RANGE)? {
        return Ok(Vec::new());
    }
    let table_name = service_table_name(service);
    range(txn, codec, TableDefinition::new(&table_name), time_range)
}

/// [`latest`] over a service's sub-container.
pub(crate) fn service_latest<S: Sample>(
    txn: &ReadTransaction,
    codec: &RecordCodec,
    service: &str,
) -> Result<Option<S>> {
    if !service_exists(txn, service, OP_LATEST)? {
        return Ok(None);
    }
    let table_name = service_table_name(service);
    latest(txn, codec, TableDefinition::new(&table_name))
}
