//! Record encoding.
//!
//! Samples are stored as `bincode` payloads: fixed-width little-endian
//! integers, no envelope or type tag, trailing bytes rejected. The key scheme
//! is independent of the payload.
//!
//! # Buffer reuse
//!
//! Encoding happens on every write, so [`RecordCodec`] draws its scratch
//! buffers from a [`BufferPool`]. A buffer is handed out as a [`PooledBuf`]
//! and goes back to the pool when dropped. The pool only affects allocation
//! counts: an empty, full, or disabled pool falls back to a fresh `Vec` and
//! the encoded bytes are identical.

use std::ops::Deref;

use bincode::Options;
use crossbeam_queue::ArrayQueue;

use crate::error::{DecodeError, EncodeError, Result};
use crate::sample::Sample;

/// Upper bound on a single encoded record.
///
/// Also bounds allocations when decoding a corrupted length prefix.
pub const MAX_RECORD_LEN: u64 = 1024 * 1024;

/// Default number of idle buffers kept by a pool.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Initial capacity of a freshly allocated buffer. Covers every sample kind
/// with a short service name and error message.
const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Buffers that grew past this are dropped instead of pooled.
const MAX_RETAINED_CAPACITY: usize = 64 * 1024;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_RECORD_LEN)
        .reject_trailing_bytes()
}

/// Bounded, thread-safe pool of reusable byte buffers.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Option<ArrayQueue<Vec<u8>>>,
}

impl BufferPool {
    /// Creates a pool that retains up to `capacity` idle buffers.
    ///
    /// A `capacity` of 0 yields a disabled pool.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: (capacity > 0).then(|| ArrayQueue::new(capacity)),
        }
    }

    /// Creates a pool that never retains buffers.
    pub fn disabled() -> Self {
        Self { buffers: None }
    }

    /// Takes an empty buffer from the pool, allocating if none is idle.
    pub fn acquire(&self) -> PooledBuf<'_> {
        let buf = self
            .buffers
            .as_ref()
            .and_then(ArrayQueue::pop)
            .unwrap_or_else(|| Vec::with_capacity(INITIAL_BUFFER_CAPACITY));

        PooledBuf { buf, pool: self }
    }

    /// Number of idle buffers currently held.
    pub fn idle(&self) -> usize {
        self.buffers.as_ref().map_or(0, ArrayQueue::len)
    }

    fn release(&self, mut buf: Vec<u8>) {
        let Some(buffers) = &self.buffers else {
            return;
        };
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        buf.clear();
        // Full pool: let the buffer drop.
        let _ = buffers.push(buf);
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

/// A buffer on loan from a [`BufferPool`].
#[derive(Debug)]
pub struct PooledBuf<'a> {
    buf: Vec<u8>,
    pool: &'a BufferPool,
}

impl Deref for PooledBuf<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl Drop for PooledBuf<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}

/// Encodes and decodes sample payloads.
#[derive(Debug, Default)]
pub struct RecordCodec {
    pool: BufferPool,
}

impl RecordCodec {
    /// Creates a codec drawing scratch buffers from `pool`.
    pub fn new(pool: BufferPool) -> Self {
        Self { pool }
    }

    /// Encodes `sample` into a pooled buffer.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if the sample exceeds [`MAX_RECORD_LEN`].
    pub fn encode<S: Sample>(&self, sample: &S) -> Result<PooledBuf<'_>> {
        let mut out = self.pool.acquire();
        options()
            .serialize_into(&mut out.buf, sample)
            .map_err(|source| EncodeError {
                kind: S::KIND,
                source,
            })?;
        Ok(out)
    }

    /// Decodes a payload produced by [`RecordCodec::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if `bytes` is truncated, has trailing data,
    /// or does not describe an `S`.
    pub fn decode<S: Sample>(&self, bytes: &[u8]) -> Result<S> {
        options().deserialize(bytes).map_err(|source| {
            DecodeError {
                kind: S::KIND,
                source,
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{
        ProcessCpu, ProcessMemory, ProcessMetricSample, ProcessState, SystemCpuSample,
        SystemMemorySample,
    };
    use std::time::Duration;

    fn process_sample() -> ProcessMetricSample {
        ProcessMetricSample {
            service_name: "api-gateway".to_string(),
            pid: 4242,
            state: ProcessState::Running,
            healthy: true,
            cpu: ProcessCpu {
                user: 1200,
                system: 300,
                children_user: 5,
                children_system: 1,
                usage_percent: 12.5,
            },
            memory: ProcessMemory {
                rss: 64 * 1024 * 1024,
                vms: 512 * 1024 * 1024,
                swap: 0,
                shared: 4096,
                data: 1 << 20,
                stack: 132 * 1024,
            },
            start_time_ns: 1_700_000_000_000_000_000,
            uptime: Duration::from_secs(3600),
            restart_count: 2,
            last_error: "exit status 1".to_string(),
            timestamp_ns: 1_700_000_003_600_000_000,
        }
    }

    #[test]
    fn test_cpu_round_trip_zero_and_max() {
        let codec = RecordCodec::default();

        let zero = SystemCpuSample::default();
        let buf = codec.encode(&zero).unwrap();
        assert_eq!(codec.decode::<SystemCpuSample>(&buf).unwrap(), zero);
        drop(buf);

        let max = SystemCpuSample {
            user: u64::MAX,
            nice: u64::MAX,
            system: u64::MAX,
            idle: u64::MAX,
            iowait: u64::MAX,
            irq: u64::MAX,
            softirq: u64::MAX,
            steal: u64::MAX,
            guest: u64::MAX,
            guest_nice: u64::MAX,
            timestamp_ns: u64::MAX,
        };
        let buf = codec.encode(&max).unwrap();
        assert_eq!(codec.decode::<SystemCpuSample>(&buf).unwrap(), max);
    }

    #[test]
    fn test_memory_round_trip() {
        let codec = RecordCodec::default();
        let mem = SystemMemorySample {
            total: 16 << 30,
            available: 8 << 30,
            free: 2 << 30,
            used: 8 << 30,
            cached: 4 << 30,
            buffers: 256 << 20,
            shared: 128 << 20,
            swap_total: 2 << 30,
            swap_free: 2 << 30,
            timestamp_ns: 1_700_000_000_000_000_000,
        };
        let buf = codec.encode(&mem).unwrap();
        assert_eq!(codec.decode::<SystemMemorySample>(&buf).unwrap(), mem);
    }

    #[test]
    fn test_process_round_trip() {
        let codec = RecordCodec::default();
        let sample = process_sample();
        let buf = codec.encode(&sample).unwrap();
        assert_eq!(codec.decode::<ProcessMetricSample>(&buf).unwrap(), sample);

        let empty = ProcessMetricSample::default();
        let buf = codec.encode(&empty).unwrap();
        assert_eq!(codec.decode::<ProcessMetricSample>(&buf).unwrap(), empty);
    }

    #[test]
    fn test_fixed_width_layout() {
        // 11 u64 fields, no envelope.
        let codec = RecordCodec::default();
        let buf = codec.encode(&SystemCpuSample::default()).unwrap();
        assert_eq!(buf.len(), 11 * 8);
    }

    #[test]
    fn test_truncated_record_fails() {
        let codec = RecordCodec::default();
        let buf = codec.encode(&SystemCpuSample::default()).unwrap();

        let err = codec
            .decode::<SystemCpuSample>(&buf[..buf.len() - 1])
            .unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_trailing_bytes_fail() {
        let codec = RecordCodec::default();
        let mut bytes = codec.encode(&SystemMemorySample::default()).unwrap().to_vec();
        bytes.push(0);

        assert!(codec.decode::<SystemMemorySample>(&bytes).unwrap_err().is_decode());
    }

    #[test]
    fn test_foreign_record_fails() {
        // A CPU payload is longer than a memory payload.
        let codec = RecordCodec::default();
        let bytes = codec.encode(&SystemCpuSample::default()).unwrap().to_vec();
        assert!(codec.decode::<SystemMemorySample>(&bytes).is_err());

        assert!(codec.decode::<ProcessMetricSample>(&[0xFF; 12]).is_err());
    }

    #[test]
    fn test_buffers_return_to_pool() {
        let codec = RecordCodec::new(BufferPool::new(2));
        assert_eq!(codec.pool.idle(), 0);

        {
            let _a = codec.encode(&SystemCpuSample::default()).unwrap();
            let _b = codec.encode(&SystemCpuSample::default()).unwrap();
            let _c = codec.encode(&SystemCpuSample::default()).unwrap();
        }
        // Third buffer is dropped: pool holds at most two.
        assert_eq!(codec.pool.idle(), 2);

        let buf = codec.encode(&SystemCpuSample::default()).unwrap();
        assert_eq!(codec.pool.idle(), 1);
        assert_eq!(buf.len(), 11 * 8);
    }

    #[test]
    fn test_disabled_pool_is_equivalent() {
        let pooled = RecordCodec::default();
        let direct = RecordCodec::new(BufferPool::disabled());
        let sample = process_sample();

        let a = pooled.encode(&sample).unwrap().to_vec();
        let b = direct.encode(&sample).unwrap().to_vec();
        assert_eq!(a, b);
        assert_eq!(direct.pool.idle(), 0);
        assert_eq!(BufferPool::new(0).idle(), 0);
    }

    #[test]
    fn test_reused_buffer_is_cleared() {
        let codec = RecordCodec::new(BufferPool::new(1));
        drop(codec.encode(&process_sample()).unwrap());

        let buf = codec.encode(&SystemCpuSample::default()).unwrap();
        assert_eq!(buf.len(), 11 * 8);
    }
}
