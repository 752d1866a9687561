//! CLI for the vigil metrics store.
//!
//! Provides commands for inspecting, querying, pruning, and benchmarking
//! vigil store files.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use vigil::{
    ProcessMetricSample, ProcessState, Store, StoreConfig, SystemCpuSample, SystemMemorySample,
    TimeRange,
};

/// vigil: embedded time-series store for supervisor metrics.
#[derive(Parser)]
#[command(name = "vigil", version, about)]
struct Cli {
    /// How long to wait if another process holds the store file.
    #[arg(long, global = true, default_value = "5s", value_parser = humantime::parse_duration)]
    open_timeout: Duration,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Display store metadata, services, and file size.
    Info {
        /// Path to the store file.
        store_path: PathBuf,
    },

    /// Query samples from a store.
    Query {
        /// Path to the store file.
        store_path: PathBuf,

        /// Which series to read.
        kind: SeriesKind,

        /// Service to read (required for `process`).
        #[arg(long)]
        service: Option<String>,

        /// How far back to read (e.g., "1h", "30m", "7d").
        #[arg(long, default_value = "1h", value_parser = humantime::parse_duration)]
        range: Duration,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Print the most recent sample as JSON.
    Latest {
        /// Path to the store file.
        store_path: PathBuf,

        /// Which series to read.
        kind: SeriesKind,

        /// Service to read (required for `process`).
        #[arg(long)]
        service: Option<String>,
    },

    /// Delete samples older than a given age.
    Prune {
        /// Path to the store file.
        store_path: PathBuf,

        /// Samples older than this are deleted.
        #[arg(long, default_value = "24h", value_parser = humantime::parse_duration)]
        older_than: Duration,
    },

    /// Run a write-path microbenchmark.
    Bench {
        /// Number of samples to write.
        #[arg(long, default_value = "10000")]
        points: u64,

        /// Number of services to spread process samples across.
        #[arg(long, default_value = "10")]
        services: u32,
    },
}

/// The series a query reads.
#[derive(Clone, Copy, ValueEnum)]
enum SeriesKind {
    /// System CPU counters.
    Cpu,
    /// System memory counters.
    Memory,
    /// Per-service process metrics.
    Process,
}

/// Output format for query results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON array of objects.
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let open_timeout = cli.open_timeout;

    let result = match cli.command {
        Commands::Info { store_path } => cmd_info(&store_path, open_timeout),
        Commands::Query {
            store_path,
            kind,
            service,
            range,
            format,
        } => cmd_query(
            &store_path,
            open_timeout,
            kind,
            service.as_deref(),
            range,
            &format,
        ),
        Commands::Latest {
            store_path,
            kind,
            service,
        } => cmd_latest(&store_path, open_timeout, kind, service.as_deref()),
        Commands::Prune {
            store_path,
            older_than,
        } => cmd_prune(&store_path, open_timeout, older_than),
        Commands::Bench { points, services } => cmd_bench(points, services),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Opens an existing store. Refuses to create one.
fn open_existing(
    store_path: &Path,
    open_timeout: Duration,
) -> Result<Store, Box<dyn std::error::Error>> {
    if !store_path.is_file() {
        return Err(format!("No store found at '{}'", store_path.display()).into());
    }
    let config = StoreConfig::new(store_path).with_open_timeout(open_timeout);
    Ok(Store::open(config)?)
}

fn require_service(service: Option<&str>) -> Result<&str, Box<dyn std::error::Error>> {
    service.ok_or_else(|| "--service is required for process metrics".into())
}

/// Implements `vigil info <store_path>`.
fn cmd_info(store_path: &Path, open_timeout: Duration) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(store_path, open_timeout)?;
    let cancel = CancellationToken::new();

    let meta = store.metadata(&cancel)?;
    let services = store.list_services(&cancel)?;

    println!("Store: {}", store_path.display());
    println!("  Schema version: {}", meta.version);
    println!("  Created: {}", format_timestamp(meta.created_ns));
    match meta.last_prune_ns {
        Some(ts) => println!("  Last prune: {}", format_timestamp(ts)),
        None => println!("  Last prune: never"),
    }
    println!();

    let cpu = store.get_system_cpu(&cancel, TimeRange::all())?;
    let memory = store.get_system_memory(&cancel, TimeRange::all())?;
    println!("System CPU samples: {}", cpu.len());
    println!("System memory samples: {}", memory.len());
    println!();

    println!("Services: {}", services.len());
    for service in &services {
        let count = store
            .get_process_metrics(&cancel, service, TimeRange::all())?
            .len();
        match store.get_latest_process_metrics(&cancel, service) {
            Ok(latest) => println!(
                "  - {service}: {count} samples, latest {} ({})",
                format_timestamp(latest.timestamp_ns),
                latest.state
            ),
            Err(e) if e.is_not_found() => println!("  - {service}: no samples"),
            Err(e) => return Err(e.into()),
        }
    }
    println!();

    let size = std::fs::metadata(store_path)?.len();
    println!("File size: {} ({size} bytes)", format_bytes(size));

    store.close()?;
    Ok(())
}

/// Implements `vigil query <store_path> <kind>`.
fn cmd_query(
    store_path: &Path,
    open_timeout: Duration,
    kind: SeriesKind,
    service: Option<&str>,
    range: Duration,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(store_path, open_timeout)?;
    let cancel = CancellationToken::new();
    let window = TimeRange::last(range, vigil::now_ns());
    debug!(since_ns = window.since_ns, until_ns = window.until_ns, "querying");

    match kind {
        SeriesKind::Cpu => {
            let data = store.get_system_cpu(&cancel, window)?;
            emit(format, "system_cpu", &data, CPU_HEADER, cpu_row)?;
        }
        SeriesKind::Memory => {
            let data = store.get_system_memory(&cancel, window)?;
            emit(format, "system_memory", &data, MEMORY_HEADER, memory_row)?;
        }
        SeriesKind::Process => {
            let service = require_service(service)?;
            let data = store.get_process_metrics(&cancel, service, window)?;
            emit(format, service, &data, PROCESS_HEADER, process_row)?;
        }
    }

    store.close()?;
    Ok(())
}

/// Implements `vigil latest <store_path> <kind>`.
fn cmd_latest(
    store_path: &Path,
    open_timeout: Duration,
    kind: SeriesKind,
    service: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(store_path, open_timeout)?;
    let cancel = CancellationToken::new();

    let value = match kind {
        SeriesKind::Cpu => serde_json::to_value(store.get_latest_system_cpu(&cancel)?)?,
        SeriesKind::Memory => serde_json::to_value(store.get_latest_system_memory(&cancel)?)?,
        SeriesKind::Process => {
            let service = require_service(service)?;
            serde_json::to_value(store.get_latest_process_metrics(&cancel, service)?)?
        }
    };
    println!("{}", serde_json::to_string_pretty(&value)?);

    store.close()?;
    Ok(())
}

/// Implements `vigil prune <store_path>`.
fn cmd_prune(
    store_path: &Path,
    open_timeout: Duration,
    older_than: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(store_path, open_timeout)?;
    let deleted = store.prune(&CancellationToken::new(), older_than)?;
    println!(
        "Deleted {deleted} samples older than {}",
        humantime::format_duration(older_than)
    );
    store.close()?;
    Ok(())
}

/// Implements `vigil bench`.
#[allow(clippy::cast_precision_loss)] // Benchmark stats are fine with f64 precision
fn cmd_bench(points: u64, services: u32) -> Result<(), Box<dyn std::error::Error>> {
    let services = services.max(1);
    println!("vigil write-path benchmark");
    println!("  Points: {points}");
    println!("  Services: {services}");
    println!();

    let path = std::env::temp_dir().join(format!("vigil_bench_{}.redb", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let store = Store::open(StoreConfig::new(&path))?;
    let cancel = CancellationToken::new();
    let names: Vec<String> = (0..services).map(|i| format!("svc-{i}")).collect();

    println!("Writing {points} process samples across {services} services...");

    let start = Instant::now();

    for i in 0..points {
        let service = &names[usize::try_from(i % u64::from(services))?];
        let sample = ProcessMetricSample {
            service_name: service.clone(),
            pid: 1000 + services,
            state: ProcessState::Running,
            healthy: true,
            timestamp_ns: bench_timestamp(i),
            ..Default::default()
        };
        store.write_process_metrics(&cancel, &sample)?;
    }

    let elapsed = start.elapsed();
    let us_per_write = elapsed.as_micros() as f64 / points.max(1) as f64;
    let writes_per_sec = points as f64 / elapsed.as_secs_f64();

    let query_start = Instant::now();
    let read = store
        .get_process_metrics(&cancel, &names[0], TimeRange::all())?
        .len();
    let query_elapsed = query_start.elapsed();

    println!();
    println!("Results:");
    println!("  Total writes: {points}");
    println!("  Elapsed: {elapsed:.3?}");
    println!("  Avg latency: {us_per_write:.1} us/write");
    println!("  Throughput: {writes_per_sec:.0} writes/sec");
    println!("  Full scan of {}: {read} samples in {query_elapsed:.3?}", names[0]);
    println!();

    store.close()?;
    let _ = std::fs::remove_file(&path);

    Ok(())
}

/// Timestamp of the `i`th benchmark sample: one second apart from a fixed
/// base, clamped at `u64::MAX` for huge point counts.
fn bench_timestamp(i: u64) -> u64 {
    const BASE_TIME: u64 = 1_700_000_000_000_000_000;
    const SECOND: u64 = 1_000_000_000;
    BASE_TIME.saturating_add(i.saturating_mul(SECOND))
}

const CPU_HEADER: &str =
    "timestamp_ns,user,nice,system,idle,iowait,irq,softirq,steal,guest,guest_nice";

fn cpu_row(s: &SystemCpuSample) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{},{},{}",
        s.timestamp_ns,
        s.user,
        s.nice,
        s.system,
        s.idle,
        s.iowait,
        s.irq,
        s.softirq,
        s.steal,
        s.guest,
        s.guest_nice
    )
}

const MEMORY_HEADER: &str =
    "timestamp_ns,total,available,free,used,cached,buffers,shared,swap_total,swap_free";

fn memory_row(s: &SystemMemorySample) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{},{}",
        s.timestamp_ns,
        s.total,
        s.available,
        s.free,
        s.used,
        s.cached,
        s.buffers,
        s.shared,
        s.swap_total,
        s.swap_free
    )
}

const PROCESS_HEADER: &str =
    "timestamp_ns,pid,state,healthy,cpu_percent,rss,vms,uptime_ms,restart_count";

fn process_row(s: &ProcessMetricSample) -> String {
    format!(
        "{},{},{},{},{:.2},{},{},{},{}",
        s.timestamp_ns,
        s.pid,
        s.state,
        s.healthy,
        s.cpu.usage_percent,
        s.memory.rss,
        s.memory.vms,
        s.uptime.as_millis(),
        s.restart_count
    )
}

/// Writes query results to stdout in the requested format.
fn emit<T: serde::Serialize>(
    format: &OutputFormat,
    series: &str,
    data: &[T],
    header: &str,
    row: fn(&T) -> String,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Csv => {
            println!("# series={series}, points={}", data.len());
            println!("{header}");
            for sample in data {
                println!("{}", row(sample));
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "series": series,
                "count": data.len(),
                "data": data,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Formats a nanosecond timestamp as RFC 3339.
fn format_timestamp(timestamp_ns: u64) -> String {
    humantime::format_rfc3339_seconds(vigil::system_time_from_timestamp(timestamp_ns)).to_string()
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)] // Byte counts are display-only
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_query() {
        let cli = Cli::try_parse_from([
            "vigil",
            "query",
            "m.redb",
            "process",
            "--service",
            "web",
            "--range",
            "90m",
            "--format",
            "json",
        ])
        .unwrap();
        let Commands::Query {
            kind,
            service,
            range,
            ..
        } = cli.command
        else {
            panic!("expected query");
        };
        assert!(matches!(kind, SeriesKind::Process));
        assert_eq!(service.as_deref(), Some("web"));
        assert_eq!(range, Duration::from_secs(90 * 60));
        assert_eq!(cli.open_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_cli_rejects_bad_duration() {
        assert!(Cli::try_parse_from(["vigil", "prune", "m.redb", "--older-than", "soon"]).is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1_048_576), "3.0 MB");
    }

    #[test]
    fn test_cpu_row_matches_header() {
        let row = cpu_row(&SystemCpuSample::default());
        assert_eq!(row.split(',').count(), CPU_HEADER.split(',').count());
        let row = memory_row(&SystemMemorySample::default());
        assert_eq!(row.split(',').count(), MEMORY_HEADER.split(',').count());
        let row = process_row(&ProcessMetricSample::default());
        assert_eq!(row.split(',').count(), PROCESS_HEADER.split(',').count());
    }

    #[test]
    fn test_bench_timestamp_saturates() {
        assert_eq!(bench_timestamp(0), 1_700_000_000_000_000_000);
        assert_eq!(bench_timestamp(2), 1_700_000_002_000_000_000);
        assert_eq!(bench_timestamp(20_000_000_000), u64::MAX);
        assert_eq!(bench_timestamp(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_format_timestamp_epoch() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00Z");
    }
}
