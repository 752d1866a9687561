//! Sortable timestamp keys.
//!
//! Every container is keyed by the sample timestamp, encoded as the 8-byte
//! big-endian form of the nanosecond count since the Unix epoch. Big-endian
//! unsigned bytes compare lexicographically in the same order as the
//! integers they encode, so a byte-ordered table is also a time-ordered one.
//!
//! Timestamps are `u64`, which makes pre-epoch instants unrepresentable.
//! Conversions from [`SystemTime`] reject them instead of wrapping them into
//! the far future.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{InputError, Result};

/// Width of an encoded key in bytes.
pub const KEY_LEN: usize = 8;

/// An encoded, byte-sortable timestamp key.
pub type TimeKey = [u8; KEY_LEN];

/// Encodes a nanosecond timestamp as a sortable key.
#[inline]
pub fn encode_key(timestamp_ns: u64) -> TimeKey {
    timestamp_ns.to_be_bytes()
}

/// Converts a wall-clock instant to nanoseconds since the epoch.
///
/// # Errors
///
/// Returns [`InputError::InvalidTimestamp`] if `time` is before the Unix
/// epoch or too far in the future to fit in 64 bits of nanoseconds.
pub fn timestamp_from_system_time(time: SystemTime) -> Result<u64> {
    let since_epoch = time
        .duration_since(UNIX_EPOCH)
        .map_err(|e| InputError::InvalidTimestamp {
            reason: format!("{:?} before the Unix epoch", e.duration()),
        })?;

    u64::try_from(since_epoch.as_nanos()).map_err(|_| {
        InputError::InvalidTimestamp {
            reason: format!("{since_epoch:?} after the epoch overflows u64 nanoseconds"),
        }
        .into()
    })
}

/// Converts nanoseconds since the epoch back to a wall-clock instant.
pub fn system_time_from_timestamp(timestamp_ns: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(timestamp_ns)
}

/// Current wall-clock time in nanoseconds since the epoch.
///
/// A clock set before the epoch reads as 0. One past year 2554 saturates.
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}

/// Computes `now - age` in nanoseconds, saturating at the epoch.
pub(crate) fn cutoff_ns(now_ns: u64, age: Duration) -> u64 {
    let age_ns = u64::try_from(age.as_nanos()).unwrap_or(u64::MAX);
    now_ns.saturating_sub(age_ns)
}
