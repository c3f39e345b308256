// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Durable spill and replay store.
//!
//! Overflow and transiently-failed payloads are appended to an append-only,
//! segmented on-disk log. Segments are sealed with a SHA-256 over their
//! record stream, verified in the background, and replayed through a
//! caller-provided sink at a bounded rate once the upstream is healthy
//! again. Each segment is deleted only after every record in it was
//! delivered (or deliberately discarded), giving at-least-once semantics
//! across restarts.
//!
//! The store knows nothing about payload contents or priorities; it moves
//! opaque byte records.

mod metrics;
mod replay;
mod segment;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use nrdq_config::SpillConfig;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use segment::{Recovery, SealedSegment, SegmentWriter, VerifyResult};

pub use metrics::StoreMetrics;

/// Name of the quarantine directory under the store directory.
const QUARANTINE_DIR: &str = "quarantine";

/// Errors surfaced by the store.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An I/O operation failed.
    #[error("I/O error on `{path}`: {source}")]
    Io {
        /// Path involved in the failing operation.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Compressing a payload failed.
    #[error("compression error: {source}")]
    Compress {
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// What the replay sink did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayDisposition {
    /// The upstream accepted the record.
    Delivered,
    /// Transient failure; replay retries with backoff.
    Retry,
    /// Permanent failure; replay drops the record and counts it.
    Discard,
}

/// Consumer of replayed records, typically an exporter adapter.
#[async_trait]
pub trait ReplaySink: Send + Sync {
    /// Attempts to deliver one record upstream.
    async fn send(&self, payload: Bytes) -> ReplayDisposition;
}

/// Result of a `start_replay` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStart {
    /// A new session was spawned.
    Started,
    /// A session is already running; the call did nothing.
    AlreadyRunning,
}

/// Outcome of one verification sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOutcome {
    /// Sealed segments checked.
    pub checked: usize,
    /// Segments moved to quarantine.
    pub quarantined: usize,
}

#[derive(Debug)]
struct StoreInner {
    active: Option<SegmentWriter>,
    /// Sealed segments in append order (lexicographic by name).
    sealed: Vec<SealedSegment>,
    /// Segment currently claimed by the replay worker, if any.
    claimed: Option<PathBuf>,
}

#[derive(Debug)]
struct ReplaySession {
    cancel: CancellationToken,
    finished: Arc<AtomicBool>,
}

/// Segmented durable store with background verification and paced replay.
///
/// The store is a cheap handle over shared state: clones observe the same
/// segments, session and metrics, which is how the replay and verification
/// workers hold onto it.
#[derive(Debug, Clone)]
pub struct SpillStore {
    config: Arc<SpillConfig>,
    inner: Arc<Mutex<StoreInner>>,
    session: Arc<Mutex<Option<ReplaySession>>>,
    metrics: StoreMetrics,
}

impl SpillStore {
    /// Opens (or creates) the store directory, recovers crash survivors,
    /// verifies every sealed segment and makes them available for replay.
    pub fn open(config: SpillConfig, metrics: StoreMetrics) -> Result<Self, Error> {
        std::fs::create_dir_all(&config.directory).map_err(|e| Error::Io {
            path: config.directory.display().to_string(),
            source: e,
        })?;
        let quarantine = config.directory.join(QUARANTINE_DIR);
        std::fs::create_dir_all(&quarantine).map_err(|e| Error::Io {
            path: quarantine.display().to_string(),
            source: e,
        })?;

        let store = Self {
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(StoreInner {
                active: None,
                sealed: Vec::new(),
                claimed: None,
            })),
            session: Arc::new(Mutex::new(None)),
            metrics,
        };
        store.recover()?;
        let outcome = store.verify_all();
        let sealed = store.sealed_count();
        info!(
            directory = %store.config.directory.display(),
            sealed_segments = sealed,
            quarantined = outcome.quarantined,
            "spill store opened"
        );
        Ok(store)
    }

    fn recover(&self) -> Result<(), Error> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.config.directory)
            .map_err(|e| Error::Io {
                path: self.config.directory.display().to_string(),
                source: e,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file() && path.extension().map(|ext| ext == "dlq").unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut recovered = Vec::new();
        for path in paths {
            match segment::recover_segment(&path).map_err(|e| Error::Io {
                path: path.display().to_string(),
                source: e,
            })? {
                Recovery::AlreadySealed(sealed) => recovered.push(sealed),
                Recovery::Resealed { segment, truncated } => {
                    if truncated {
                        self.metrics.dlq_recovered_truncated_total.inc();
                        warn!(segment = %segment.path.display(), "discarded truncated tail during recovery");
                    }
                    info!(segment = %segment.path.display(), records = segment.record_count, "sealed crash survivor");
                    recovered.push(segment);
                }
                Recovery::Removed => {
                    debug!(segment = %path.display(), "removed empty crash survivor");
                }
                Recovery::Corrupt => {
                    self.quarantine_file(&path);
                }
            }
        }
        self.inner.lock().sealed = recovered;
        self.refresh_gauges();
        Ok(())
    }

    /// Appends one payload to the active segment, compressing it first. The
    /// write is buffered; sealing is the only fsync point.
    pub fn append(&self, payload: &[u8]) -> Result<(), Error> {
        let compressed =
            zstd::encode_all(payload, 0).map_err(|e| Error::Compress { source: e })?;

        let mut inner = self.inner.lock();
        if inner.active.is_none() {
            let writer =
                SegmentWriter::create(&self.config.directory).map_err(|e| Error::Io {
                    path: self.config.directory.display().to_string(),
                    source: e,
                })?;
            debug!(segment = %writer_path(&writer), "opened new active segment");
            inner.active = Some(writer);
        }
        let writer = inner.active.as_mut().expect("active segment just ensured");
        let path = writer_path(writer);
        writer.append(&compressed).map_err(|e| Error::Io {
            path: path.clone(),
            source: e,
        })?;

        if writer.bytes() >= self.config.max_segment_bytes() {
            let writer = inner.active.take().expect("active segment present");
            let sealed = writer.seal().map_err(|e| Error::Io {
                path,
                source: e,
            })?;
            debug!(segment = %sealed.path.display(), records = sealed.record_count, "sealed segment at size threshold");
            inner.sealed.push(sealed);
        }
        drop(inner);
        self.refresh_gauges();
        Ok(())
    }

    /// Runs the integrity check over all sealed segments, skipping the one a
    /// replay session currently holds. Mismatching segments move to
    /// `quarantine/` and are counted.
    pub fn verify_all(&self) -> VerifyOutcome {
        let candidates: Vec<SealedSegment> = {
            let inner = self.inner.lock();
            inner
                .sealed
                .iter()
                .filter(|s| Some(&s.path) != inner.claimed.as_ref())
                .cloned()
                .collect()
        };

        let mut outcome = VerifyOutcome::default();
        for sealed in candidates {
            outcome.checked += 1;
            match segment::verify_segment(&sealed.path) {
                Ok(VerifyResult::Valid) => {}
                Ok(VerifyResult::Corrupt) => {
                    warn!(segment = %sealed.path.display(), "integrity mismatch, quarantining");
                    self.remove_sealed(&sealed.path);
                    self.quarantine_file(&sealed.path);
                    outcome.quarantined += 1;
                }
                Err(e) => {
                    warn!(segment = %sealed.path.display(), error = %e, "verification read failed");
                }
            }
        }
        self.refresh_gauges();
        outcome
    }

    /// Starts a replay session driving sealed segments through `sink`.
    /// Idempotent: a second call while a session is live reports busy.
    pub fn start_replay(&self, sink: Arc<dyn ReplaySink>) -> ReplayStart {
        let mut session = self.session.lock();
        if let Some(existing) = session.as_ref() {
            if !existing.finished.load(Ordering::SeqCst) && !existing.cancel.is_cancelled() {
                return ReplayStart::AlreadyRunning;
            }
        }

        let cancel = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        *session = Some(ReplaySession {
            cancel: cancel.clone(),
            finished: finished.clone(),
        });
        drop(session);

        info!(sealed_segments = self.sealed_count(), "replay session starting");
        drop(tokio::spawn(replay::run_session(
            self.clone(),
            sink,
            cancel,
            finished,
        )));
        ReplayStart::Started
    }

    /// Cancels the current replay session, if any. The worker observes the
    /// token at its next await point and exits without touching durable
    /// state.
    pub fn stop_replay(&self) {
        if let Some(session) = self.session.lock().as_ref() {
            session.cancel.cancel();
        }
    }

    /// True while a replay session is live.
    #[must_use]
    pub fn replay_running(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|s| !s.finished.load(Ordering::SeqCst))
    }

    /// Spawns the periodic verification ticker.
    pub fn spawn_verifier(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        let period = self.config.verification_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately; startup already verified.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let outcome = store.verify_all();
                        debug!(checked = outcome.checked, quarantined = outcome.quarantined, "verification sweep finished");
                    }
                }
            }
        })
    }

    /// Seals the active segment (or removes it when empty). Called on
    /// graceful shutdown after replay has stopped.
    pub fn close(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        if let Some(writer) = inner.active.take() {
            let path = writer_path(&writer);
            if writer.record_count() == 0 {
                writer.discard().map_err(|e| Error::Io {
                    path,
                    source: e,
                })?;
            } else {
                let sealed = writer.seal().map_err(|e| Error::Io {
                    path,
                    source: e,
                })?;
                info!(segment = %sealed.path.display(), records = sealed.record_count, "sealed active segment on shutdown");
                inner.sealed.push(sealed);
            }
        }
        drop(inner);
        self.refresh_gauges();
        Ok(())
    }

    /// Number of sealed segments awaiting replay.
    #[must_use]
    pub fn sealed_count(&self) -> usize {
        self.inner.lock().sealed.len()
    }

    /// Paths of the sealed segments in replay order.
    #[must_use]
    pub fn sealed_segment_paths(&self) -> Vec<PathBuf> {
        self.inner.lock().sealed.iter().map(|s| s.path.clone()).collect()
    }

    /// Bytes on disk across active and sealed segments.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        let inner = self.inner.lock();
        let active = inner.active.as_ref().map_or(0, SegmentWriter::bytes);
        active + inner.sealed.iter().map(|s| s.bytes).sum::<u64>()
    }

    /// The store's metric set.
    #[must_use]
    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    // ── accessors used by the replay worker ─────────────────────────────

    pub(crate) fn replay_rate_bytes_per_sec(&self) -> u64 {
        self.config.replay_rate_bytes_per_sec()
    }

    pub(crate) fn replay_retry_base(&self) -> Duration {
        self.config.replay_retry_base
    }

    pub(crate) fn replay_retry_cap(&self) -> Duration {
        self.config.replay_retry_cap
    }

    /// Claims the oldest sealed segment for replay. The claim shields the
    /// segment from the verifier until released.
    pub(crate) fn claim_oldest_sealed(&self) -> Option<SealedSegment> {
        let mut inner = self.inner.lock();
        let segment = inner.sealed.first().cloned()?;
        inner.claimed = Some(segment.path.clone());
        Some(segment)
    }

    /// Deletes a fully replayed segment and releases the claim.
    pub(crate) fn finish_replayed(&self, segment: &SealedSegment) {
        {
            let mut inner = self.inner.lock();
            inner.sealed.retain(|s| s.path != segment.path);
            inner.claimed = None;
        }
        if let Err(e) = std::fs::remove_file(&segment.path) {
            warn!(segment = %segment.path.display(), error = %e, "failed to delete replayed segment");
        } else {
            debug!(segment = %segment.path.display(), "deleted replayed segment");
        }
        self.refresh_gauges();
    }

    pub(crate) fn release_claim(&self) {
        self.inner.lock().claimed = None;
    }

    // ── internals ───────────────────────────────────────────────────────

    fn remove_sealed(&self, path: &PathBuf) {
        self.inner.lock().sealed.retain(|s| &s.path != path);
    }

    fn quarantine_file(&self, path: &PathBuf) {
        let Some(name) = path.file_name() else {
            return;
        };
        let target = self.config.directory.join(QUARANTINE_DIR).join(name);
        match std::fs::rename(path, &target) {
            Ok(()) => {
                self.metrics.dlq_corrupted_total.inc();
                warn!(from = %path.display(), to = %target.display(), "segment quarantined");
            }
            Err(e) => {
                error!(segment = %path.display(), error = %e, "failed to quarantine segment");
            }
        }
    }

    fn refresh_gauges(&self) {
        let (size, oldest) = {
            let inner = self.inner.lock();
            let active = inner.active.as_ref().map_or(0, SegmentWriter::bytes);
            let size = active + inner.sealed.iter().map(|s| s.bytes).sum::<u64>();
            let oldest = inner
                .sealed
                .first()
                .and_then(|s| s.created)
                .or_else(|| inner.active.as_ref().map(|w| w.created()));
            (size, oldest)
        };
        self.metrics.dlq_size_bytes.set(size);
        let ratio = size as f64 / self.config.max_total_bytes() as f64;
        self.metrics.dlq_utilization_ratio.set(ratio);
        let age = oldest
            .map(|created| (Utc::now() - created).num_seconds().max(0) as u64)
            .unwrap_or(0);
        self.metrics.dlq_oldest_age_seconds.set(age);
    }
}

fn writer_path(writer: &SegmentWriter) -> String {
    writer.path_display()
}

#[cfg(test)]
mod tests;
