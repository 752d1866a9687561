//! Integration tests for range and latest-value queries.
//!
//! These tests verify inclusive range bounds, ascending result order,
//! latest-by-timestamp semantics independent of write order, isolation
//! between service sub-containers, and the empty-store outcomes.

use std::time::{Duration, UNIX_EPOCH};

use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use vigil::{
    InputError, ProcessMetricSample, ProcessState, Store, StoreConfig, SystemCpuSample,
    SystemMemorySample, TimeRange, VigilError, timestamp_from_system_time,
};

/// Base timestamp for tests: 2023-11-14T22:13:20Z.
const BASE_TIME: u64 = 1_700_000_000_000_000_000;

const SECOND: u64 = 1_000_000_000;

fn open_store(dir: &tempfile::TempDir) -> Store {
    Store::open(StoreConfig::new(dir.path().join("query.redb"))).unwrap()
}

fn cpu(user: u64, timestamp_ns: u64) -> SystemCpuSample {
    SystemCpuSample {
        user,
        idle: 1000 - user,
        timestamp_ns,
        ..Default::default()
    }
}

fn process(service: &str, pid: u32, timestamp_ns: u64) -> ProcessMetricSample {
    ProcessMetricSample {
        service_name: service.to_string(),
        pid,
        state: ProcessState::Running,
        healthy: true,
        timestamp_ns,
        ..Default::default()
    }
}

#[test]
fn test_range_bounds_are_inclusive() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir);
    let cancel = CancellationToken::new();

    let t = BASE_TIME;
    for (user, ts) in [(1, t - 1), (2, t), (3, t + 1)] {
        store.write_system_cpu(&cancel, &cpu(user, ts)).unwrap();
    }

    let exact = store.get_system_cpu(&cancel, TimeRange::new(t, t)).unwrap();
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].user, 2);

    let all = store
        .get_system_cpu(&cancel, TimeRange::new(t - 1, t + 1))
        .unwrap();
    let users: Vec<u64> = all.iter().map(|s| s.user).collect();
    assert_eq!(users, [1, 2, 3]);

    let tail = store
        .get_system_cpu(&cancel, TimeRange::new(t + 1, u64::MAX))
        .unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].timestamp_ns, t + 1);
}

#[test]
fn test_range_is_ascending() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir);
    let cancel = CancellationToken::new();

    for offset in [7, 2, 9, 0, 5] {
        store
            .write_system_memory(
                &cancel,
                &SystemMemorySample {
                    used: offset,
                    timestamp_ns: BASE_TIME + offset * SECOND,
                    ..Default::default()
                },
            )
            .unwrap();
    }

    let samples = store.get_system_memory(&cancel, TimeRange::all()).unwrap();
    let timestamps: Vec<u64> = samples.iter().map(|s| s.timestamp_ns).collect();
    let mut sorted = timestamps.clone();
    sorted.sort_unstable();
    assert_eq!(timestamps, sorted);
    assert_eq!(samples.len(), 5);
}

#[test]
fn test_inverted_range_is_empty_not_error() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir);
    let cancel = CancellationToken::new();
    store.write_system_cpu(&cancel, &cpu(1, BASE_TIME)).unwrap();

    let none = store
        .get_system_cpu(&cancel, TimeRange::new(BASE_TIME + 1, BASE_TIME - 1))
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_latest_regardless_of_write_order() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir);
    let cancel = CancellationToken::new();

    store.write_system_cpu(&cancel, &cpu(20, BASE_TIME + 20)).unwrap();
    store.write_system_cpu(&cancel, &cpu(10, BASE_TIME + 10)).unwrap();

    let latest = store.get_latest_system_cpu(&cancel).unwrap();
    assert_eq!(latest.timestamp_ns, BASE_TIME + 20);
    assert_eq!(latest.user, 20);
}

#[test]
fn test_services_are_isolated() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir);
    let cancel = CancellationToken::new();

    for (i, service) in ["a", "b", "c"].into_iter().enumerate() {
        let pid = 100 + u32::try_from(i).unwrap();
        for n in 0..=i as u64 {
            store
                .write_process_metrics(&cancel, &process(service, pid, BASE_TIME + n * SECOND))
                .unwrap();
        }
    }

    for (i, service) in ["a", "b", "c"].into_iter().enumerate() {
        let samples = store
            .get_process_metrics(&cancel, service, TimeRange::all())
            .unwrap();
        assert_eq!(samples.len(), i + 1);
        assert!(samples.iter().all(|s| s.service_name == service));

        let latest = store.get_latest_process_metrics(&cancel, service).unwrap();
        assert_eq!(latest.pid, 100 + u32::try_from(i).unwrap());
    }

    assert_eq!(store.list_services(&cancel).unwrap(), ["a", "b", "c"]);
}

#[test]
fn test_same_timestamp_last_write_wins() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir);
    let cancel = CancellationToken::new();

    store.write_process_metrics(&cancel, &process("web", 1, BASE_TIME)).unwrap();
    store.write_process_metrics(&cancel, &process("web", 2, BASE_TIME)).unwrap();

    let samples = store
        .get_process_metrics(&cancel, "web", TimeRange::all())
        .unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].pid, 2);
}

#[test]
fn test_empty_store_outcomes() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir);
    let cancel = CancellationToken::new();

    assert!(store.get_system_cpu(&cancel, TimeRange::all()).unwrap().is_empty());
    assert!(store.get_system_memory(&cancel, TimeRange::all()).unwrap().is_empty());
    assert!(
        store
            .get_process_metrics(&cancel, "nobody", TimeRange::all())
            .unwrap()
            .is_empty()
    );

    assert!(store.get_latest_system_cpu(&cancel).unwrap_err().is_not_found());
    assert!(store.get_latest_system_memory(&cancel).unwrap_err().is_not_found());
    assert!(
        store
            .get_latest_process_metrics(&cancel, "nobody")
            .unwrap_err()
            .is_not_found()
    );
}

#[test]
fn test_process_record_round_trips_through_store() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir);
    let cancel = CancellationToken::new();

    let mut sample = process("worker", 4242, BASE_TIME);
    sample.state = ProcessState::Failed;
    sample.healthy = false;
    sample.cpu.usage_percent = 97.5;
    sample.memory.rss = 256 << 20;
    sample.uptime = Duration::from_millis(1500);
    sample.restart_count = 3;
    sample.last_error = "exit status 137".to_string();

    store.write_process_metrics(&cancel, &sample).unwrap();
    assert_eq!(store.get_latest_process_metrics(&cancel, "worker").unwrap(), sample);
}

#[test]
fn test_empty_service_name_rejected() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir);
    let cancel = CancellationToken::new();

    let err = store
        .write_process_metrics(&cancel, &process("", 1, BASE_TIME))
        .unwrap_err();
    assert!(matches!(err, VigilError::Input(InputError::EmptyServiceName)));
}

#[test]
fn test_system_time_keys_order_with_queries() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir);
    let cancel = CancellationToken::new();

    let early = timestamp_from_system_time(UNIX_EPOCH + Duration::from_secs(10)).unwrap();
    let late = timestamp_from_system_time(UNIX_EPOCH + Duration::from_secs(20)).unwrap();
    store.write_system_cpu(&cancel, &cpu(1, late)).unwrap();
    store.write_system_cpu(&cancel, &cpu(2, early)).unwrap();

    let window = store
        .get_system_cpu(&cancel, TimeRange::new(early, early + SECOND))
        .unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].user, 2);

    assert!(timestamp_from_system_time(UNIX_EPOCH - Duration::from_secs(1)).is_err());
}
