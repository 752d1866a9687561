//! Port traits consumed by the metrics-recording and query layers.
//!
//! Collection loops depend on [`MetricsWriter`], query handlers on
//! [`MetricsReader`], the retention scheduler on [`MetricsMaintainer`].
//! [`Store`] implements all three; [`MetricsStore`] names the combination.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::query::TimeRange;
use crate::sample::{ProcessMetricSample, SystemCpuSample, SystemMemorySample};
use crate::store::Store;

/// Write side of the metrics store.
pub trait MetricsWriter: Send + Sync {
    /// Stores a system CPU sample.
    fn write_system_cpu(&self, cancel: &CancellationToken, sample: &SystemCpuSample)
    -> Result<()>;

    /// Stores a system memory sample.
    fn write_system_memory(
        &self,
        cancel: &CancellationToken,
        sample: &SystemMemorySample,
    ) -> Result<()>;

    /// Stores a process sample under its service.
    fn write_process_metrics(
        &self,
        cancel: &CancellationToken,
        sample: &ProcessMetricSample,
    ) -> Result<()>;
}

/// Read side of the metrics store.
pub trait MetricsReader: Send + Sync {
    /// System CPU samples in a range, ascending.
    fn get_system_cpu(
        &self,
        cancel: &CancellationToken,
        time_range: TimeRange,
    ) -> Result<Vec<SystemCpuSample>>;

    /// System memory samples in a range, ascending.
    fn get_system_memory(
        &self,
        cancel: &CancellationToken,
        time_range: TimeRange,
    ) -> Result<Vec<SystemMemorySample>>;

    /// A service's samples in a range, ascending.
    fn get_process_metrics(
        &self,
        cancel: &CancellationToken,
        service: &str,
        time_range: TimeRange,
    ) -> Result<Vec<ProcessMetricSample>>;

    /// Most recent system CPU sample, or a not-found error.
    fn get_latest_system_cpu(&self, cancel: &CancellationToken) -> Result<SystemCpuSample>;

    /// Most recent system memory sample, or a not-found error.
    fn get_latest_system_memory(&self, cancel: &CancellationToken) -> Result<SystemMemorySample>;

    /// Most recent sample for a service, or a not-found error.
    fn get_latest_process_metrics(
        &self,
        cancel: &CancellationToken,
        service: &str,
    ) -> Result<ProcessMetricSample>;
}

/// Maintenance side of the metrics store.
pub trait MetricsMaintainer: Send + Sync {
    /// Deletes samples older than `older_than`, returning how many.
    fn prune(&self, cancel: &CancellationToken, older_than: Duration) -> Result<usize>;

    /// Releases the store.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Everything a store exposes.
pub trait MetricsStore: MetricsWriter + MetricsReader + MetricsMaintainer {}

impl<T: MetricsWriter + MetricsReader + MetricsMaintainer> MetricsStore for T {}

impl MetricsWriter for Store {
    fn write_system_cpu(
        &self,
        cancel: &CancellationToken,
        sample: &SystemCpuSample,
    ) -> Result<()> {
        Store::write_system_cpu(self, cancel, sample)
    }

    fn write_system_memory(
        &self,
        cancel: &CancellationToken,
        sample: &SystemMemorySample,
    ) -> Result<()> {
        Store::write_system_memory(self, cancel, sample)
    }

    fn write_process_metrics(
        &self,
        cancel: &CancellationToken,
        sample: &ProcessMetricSample,
    ) -> Result<()> {
        Store::write_process_metrics(self, cancel, sample)
    }
}

impl MetricsReader for Store {
    fn get_system_cpu(
        &self,
        cancel: &CancellationToken,
        time_range: TimeRange,
    ) -> Result<Vec<SystemCpuSample>> {
        Store::get_system_cpu(self, cancel, time_range)
    }

    fn get_system_memory(
        &self,
        cancel: &CancellationToken,
        time_range: TimeRange,
    ) -> Result<Vec<SystemMemorySample>> {
        Store::get_system_memory(self, cancel, time_range)
    }

    fn get_process_metrics(
        &self,
        cancel: &CancellationToken,
        service: &str,
        time_range: TimeRange,
    ) -> Result<Vec<ProcessMetricSample>> {
        Store::get_process_metrics(self, cancel, service, time_range)
    }

    fn get_latest_system_cpu(&self, cancel: &CancellationToken) -> Result<SystemCpuSample> {
        Store::get_latest_system_cpu(self, cancel)
    }

    fn get_latest_system_memory(&self, cancel: &CancellationToken) -> Result<SystemMemorySample> {
        Store::get_latest_system_memory(self, cancel)
    }

    fn get_latest_process_metrics(
        &self,
        cancel: &CancellationToken,
        service: &str,
    ) -> Result<ProcessMetricSample> {
        Store::get_latest_process_metrics(self, cancel, service)
    }
}

impl MetricsMaintainer for Store {
    fn prune(&self, cancel: &CancellationToken, older_than: Duration) -> Result<usize> {
        Store::prune(self, cancel, older_than)
    }

    fn close(self) -> Result<()> {
        Store::close(self)
    }
}
