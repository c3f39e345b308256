// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Store-level tests: rotation, replay, verification, recovery.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use byte_unit::Byte;
use bytes::Bytes;
use nrdq_config::SpillConfig;
use parking_lot::Mutex;
use tempfile::tempdir;

use crate::{ReplayDisposition, ReplaySink, ReplayStart, SpillStore, StoreMetrics};

fn config(dir: &Path, max_segment_bytes: u64) -> SpillConfig {
    SpillConfig {
        directory: dir.to_path_buf(),
        max_segment_bytes: Byte::from_u64(max_segment_bytes),
        max_total_bytes: Byte::from_u64(1 << 30),
        verification_interval: Duration::from_secs(600),
        // High enough that pacing never stalls these tests.
        replay_rate_bytes_per_sec: Byte::from_u64(512 * 1024 * 1024),
        replay_retry_base: Duration::from_secs(1),
        replay_retry_cap: Duration::from_secs(30),
    }
}

/// Deterministic, incompressible-ish payload so segment sizes are stable
/// across runs.
fn payload(i: u64) -> Vec<u8> {
    let mut state = i.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(1);
    let mut out = format!("record-{i:03}:").into_bytes();
    for _ in 0..112 {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        out.push((state >> 56) as u8);
    }
    out
}

struct CollectingSink {
    received: Mutex<Vec<Bytes>>,
}

impl CollectingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            received: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ReplaySink for CollectingSink {
    async fn send(&self, payload: Bytes) -> ReplayDisposition {
        self.received.lock().push(payload);
        ReplayDisposition::Delivered
    }
}

/// Fails the first `failures` sends with a transient outcome.
struct FlakySink {
    failures: usize,
    attempts: AtomicUsize,
    received: Mutex<Vec<Bytes>>,
}

#[async_trait]
impl ReplaySink for FlakySink {
    async fn send(&self, payload: Bytes) -> ReplayDisposition {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            ReplayDisposition::Retry
        } else {
            self.received.lock().push(payload);
            ReplayDisposition::Delivered
        }
    }
}

/// Never completes a send; used to pin a session as "running".
struct StuckSink;

#[async_trait]
impl ReplaySink for StuckSink {
    async fn send(&self, _payload: Bytes) -> ReplayDisposition {
        std::future::pending().await
    }
}

async fn wait_replay_drained(store: &Arc<SpillStore>) {
    for _ in 0..1000 {
        if !store.replay_running() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("replay session did not finish in time");
}

fn dlq_files(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .expect("read dir")
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().map(|e| e == "dlq").unwrap_or(false))
        .collect();
    files.sort();
    files
}

#[tokio::test]
async fn appends_rotate_and_replay_drains_in_order() {
    let dir = tempdir().expect("tempdir");
    let metrics = StoreMetrics::default();
    let store = Arc::new(
        SpillStore::open(config(dir.path(), 1024), metrics.clone()).expect("store opens"),
    );

    let expected: Vec<Vec<u8>> = (0..50).map(payload).collect();
    for record in &expected {
        store.append(record).expect("append");
    }
    store.close().expect("close seals the active segment");
    assert!(
        store.sealed_count() >= 2,
        "1024-byte segments must have rotated, got {}",
        store.sealed_count()
    );
    assert!(metrics.dlq_size_bytes.get() > 0);
    assert!(metrics.dlq_utilization_ratio.get() > 0.0);

    let sink = CollectingSink::new();
    assert_eq!(
        store.start_replay(sink.clone()),
        ReplayStart::Started
    );
    wait_replay_drained(&store).await;

    assert_eq!(store.sealed_count(), 0);
    assert!(dlq_files(dir.path()).is_empty(), "replayed segments deleted");
    assert_eq!(metrics.dlq_replay_success_total.get(), 50);

    let received = sink.received.lock();
    assert_eq!(received.len(), 50);
    for (got, want) in received.iter().zip(&expected) {
        assert_eq!(got.as_ref(), want.as_slice(), "payloads replay bit-for-bit in order");
    }
}

#[tokio::test]
async fn replay_with_no_segments_finishes_promptly() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(
        SpillStore::open(config(dir.path(), 4096), StoreMetrics::default()).expect("store opens"),
    );
    assert_eq!(store.start_replay(CollectingSink::new()), ReplayStart::Started);
    wait_replay_drained(&store).await;

    // A finished session does not block the next one.
    assert_eq!(store.start_replay(CollectingSink::new()), ReplayStart::Started);
    wait_replay_drained(&store).await;
}

#[tokio::test]
async fn concurrent_start_replay_reports_busy() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(
        SpillStore::open(config(dir.path(), 4096), StoreMetrics::default()).expect("store opens"),
    );
    store.append(b"pinned record").expect("append");
    store.close().expect("close");

    assert_eq!(store.start_replay(Arc::new(StuckSink)), ReplayStart::Started);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        store.start_replay(CollectingSink::new()),
        ReplayStart::AlreadyRunning
    );

    store.stop_replay();
    wait_replay_drained(&store).await;
    // Cancellation left the unsent record in place.
    assert_eq!(store.sealed_count(), 1);
}

#[tokio::test]
async fn corrupted_segment_is_quarantined_and_the_rest_replays() {
    let dir = tempdir().expect("tempdir");
    let metrics = StoreMetrics::default();
    let store = Arc::new(
        SpillStore::open(config(dir.path(), 1024), metrics.clone()).expect("store opens"),
    );

    // Two sealed segments: corrupt the first.
    for i in 0..12 {
        store.append(&payload(i)).expect("append");
    }
    store.close().expect("close");
    let files = dlq_files(dir.path());
    assert!(files.len() >= 2, "need at least two segments");
    let victim = files[0].clone();
    let victim_name = victim.file_name().expect("name").to_owned();
    let mut raw = std::fs::read(&victim).expect("read victim");
    let mid = crate::segment::HEADER_LEN + (raw.len() - crate::segment::HEADER_LEN) / 2;
    raw[mid] ^= 0x40;
    std::fs::write(&victim, &raw).expect("write victim");

    let outcome = store.verify_all();
    assert_eq!(outcome.quarantined, 1);
    assert_eq!(metrics.dlq_corrupted_total.get(), 1);
    assert!(
        dir.path().join("quarantine").join(&victim_name).exists(),
        "quarantined file keeps its name"
    );
    assert!(!victim.exists());

    let sink = CollectingSink::new();
    let _ = store.start_replay(sink.clone());
    wait_replay_drained(&store).await;
    assert_eq!(store.sealed_count(), 0);
    let delivered = sink.received.lock().len() as u64;
    assert_eq!(delivered, metrics.dlq_replay_success_total.get());
    assert!(delivered > 0, "surviving segments replay normally");
}

#[tokio::test]
async fn reopen_after_crash_recovers_whole_records_only() {
    let dir = tempdir().expect("tempdir");
    let expected: Vec<Vec<u8>> = (0..3).map(payload).collect();
    {
        let store =
            SpillStore::open(config(dir.path(), 1 << 20), StoreMetrics::default())
                .expect("store opens");
        for record in &expected {
            store.append(record).expect("append");
        }
        // No close(): the active segment keeps its zeroed header, as after a
        // crash.
    }
    let files = dlq_files(dir.path());
    assert_eq!(files.len(), 1);
    {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&files[0])
            .expect("open survivor");
        file.write_all(&64u32.to_be_bytes()).expect("torn prefix");
        file.write_all(b"torn").expect("torn payload");
    }

    let metrics = StoreMetrics::default();
    let store = Arc::new(
        SpillStore::open(config(dir.path(), 1 << 20), metrics.clone()).expect("store reopens"),
    );
    assert_eq!(store.sealed_count(), 1);
    assert_eq!(metrics.dlq_recovered_truncated_total.get(), 1);

    let sink = CollectingSink::new();
    let _ = store.start_replay(sink.clone());
    wait_replay_drained(&store).await;

    let received = sink.received.lock();
    assert_eq!(received.len(), 3, "exactly the whole records replay");
    for (got, want) in received.iter().zip(&expected) {
        assert_eq!(got.as_ref(), want.as_slice());
    }
    assert_eq!(metrics.dlq_replay_success_total.get(), 3);
    assert!(dlq_files(dir.path()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn transient_send_failures_back_off_and_eventually_deliver() {
    let dir = tempdir().expect("tempdir");
    let metrics = StoreMetrics::default();
    let store = Arc::new(
        SpillStore::open(config(dir.path(), 1 << 20), metrics.clone()).expect("store opens"),
    );
    store.append(b"one").expect("append");
    store.append(b"two").expect("append");
    store.close().expect("close");

    let sink = Arc::new(FlakySink {
        failures: 3,
        attempts: AtomicUsize::new(0),
        received: Mutex::new(Vec::new()),
    });
    let _ = store.start_replay(sink.clone());
    wait_replay_drained(&store).await;

    assert_eq!(metrics.dlq_replay_success_total.get(), 2);
    assert!(sink.attempts.load(Ordering::SeqCst) >= 5, "three failures plus two deliveries");
    let received = sink.received.lock();
    assert_eq!(received[0].as_ref(), b"one");
    assert_eq!(received[1].as_ref(), b"two");
    assert_eq!(store.sealed_count(), 0);
}

#[tokio::test]
async fn permanent_failures_are_discarded_not_retried() {
    struct DiscardSink;
    #[async_trait]
    impl ReplaySink for DiscardSink {
        async fn send(&self, _payload: Bytes) -> ReplayDisposition {
            ReplayDisposition::Discard
        }
    }

    let dir = tempdir().expect("tempdir");
    let metrics = StoreMetrics::default();
    let store = Arc::new(
        SpillStore::open(config(dir.path(), 1 << 20), metrics.clone()).expect("store opens"),
    );
    store.append(b"poison").expect("append");
    store.close().expect("close");

    let _ = store.start_replay(Arc::new(DiscardSink));
    wait_replay_drained(&store).await;
    assert_eq!(metrics.dlq_replay_success_total.get(), 0);
    assert_eq!(metrics.dlq_replay_discarded_total.get(), 1);
    assert_eq!(store.sealed_count(), 0, "segment deleted after discard");
}

#[tokio::test]
async fn append_surfaces_io_errors() {
    let dir = tempdir().expect("tempdir");
    let store =
        SpillStore::open(config(dir.path(), 4096), StoreMetrics::default()).expect("store opens");
    std::fs::remove_dir_all(dir.path()).expect("remove store directory");
    let err = store.append(b"no home").expect_err("append must fail");
    assert!(matches!(err, crate::Error::Io { .. }));
}

#[test]
fn unwritable_directory_fails_open() {
    let dir = tempdir().expect("tempdir");
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file in the way").expect("write blocker");
    let err = SpillStore::open(config(&blocker, 4096), StoreMetrics::default())
        .expect_err("open must fail");
    assert!(matches!(err, crate::Error::Io { .. }));
}
