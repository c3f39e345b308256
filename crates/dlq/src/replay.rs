// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Replay worker: drives sealed segments through the caller's sink at a
//! bounded rate, alternating 500 ms replay and live phases so combined
//! outbound traffic splits roughly half/half when both are flowing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::segment::{RecordReader, SealedSegment};
use crate::{ReplayDisposition, ReplaySink, SpillStore};

/// Length of one replay or live phase.
const PHASE_LEN: Duration = Duration::from_millis(500);

/// Byte budget pacer. Successful sends add debt; the worker waits until the
/// configured rate has paid the debt down before the next send. Debt never
/// goes below zero, so idle time does not bank a burst.
struct Pacer {
    rate_bytes_per_sec: f64,
    debt_bytes: f64,
    refreshed: Instant,
}

impl Pacer {
    fn new(rate_bytes_per_sec: u64) -> Self {
        Self {
            rate_bytes_per_sec: rate_bytes_per_sec as f64,
            debt_bytes: 0.0,
            refreshed: Instant::now(),
        }
    }

    fn refresh(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.refreshed).as_secs_f64();
        self.refreshed = now;
        self.debt_bytes = (self.debt_bytes - elapsed * self.rate_bytes_per_sec).max(0.0);
    }

    /// Time until the current debt is paid off.
    fn wait_needed(&mut self) -> Option<Duration> {
        self.refresh();
        if self.debt_bytes <= 0.0 {
            None
        } else {
            Some(Duration::from_secs_f64(
                self.debt_bytes / self.rate_bytes_per_sec,
            ))
        }
    }

    fn consume(&mut self, bytes: u64) {
        self.refresh();
        self.debt_bytes += bytes as f64;
    }
}

/// The 500 ms replay/live toggle. Phase 0 (replay) starts at session start.
struct PhaseClock {
    origin: Instant,
}

impl PhaseClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    fn in_live_phase(&self) -> bool {
        let phases = Instant::now().duration_since(self.origin).as_millis() / PHASE_LEN.as_millis();
        phases % 2 == 1
    }

    /// Start of the next replay phase.
    fn next_replay_start(&self) -> Instant {
        let elapsed = Instant::now().duration_since(self.origin).as_millis() as u64;
        let phase_ms = PHASE_LEN.as_millis() as u64;
        let phases = elapsed / phase_ms + 1;
        // The next even phase boundary.
        let target = if phases % 2 == 0 { phases } else { phases + 1 };
        self.origin + Duration::from_millis(target * phase_ms)
    }
}

/// Why a segment replay stopped early.
enum SegmentStop {
    /// Every record was delivered or discarded; the segment can be deleted.
    Done,
    /// The session was cancelled mid-segment.
    Cancelled,
}

/// Session entry point, spawned by `SpillStore::start_replay`.
pub(crate) async fn run_session(
    store: SpillStore,
    sink: Arc<dyn ReplaySink>,
    cancel: CancellationToken,
    finished: Arc<AtomicBool>,
) {
    let mut pacer = Pacer::new(store.replay_rate_bytes_per_sec());
    let phases = PhaseClock::new();

    while !cancel.is_cancelled() {
        let Some(segment) = store.claim_oldest_sealed() else {
            break;
        };
        debug!(segment = %segment.path.display(), records = segment.record_count, "replaying segment");
        match replay_segment(&*sink, &segment, &store, &mut pacer, &phases, &cancel).await {
            Ok(SegmentStop::Done) => store.finish_replayed(&segment),
            Ok(SegmentStop::Cancelled) => {
                store.release_claim();
                break;
            }
            Err(e) => {
                // Leave the segment in place; the verifier decides whether it
                // is readable at all.
                warn!(segment = %segment.path.display(), error = %e, "replay read failed");
                store.release_claim();
                break;
            }
        }
    }

    finished.store(true, Ordering::SeqCst);
    debug!("replay session ended");
}

async fn replay_segment(
    sink: &dyn ReplaySink,
    segment: &SealedSegment,
    store: &SpillStore,
    pacer: &mut Pacer,
    phases: &PhaseClock,
    cancel: &CancellationToken,
) -> std::io::Result<SegmentStop> {
    let mut reader = RecordReader::open(&segment.path)?;
    while let Some((compressed, on_disk)) = reader.next_record()? {
        // Hold back while the rate budget is in debt or the toggle points at
        // live traffic.
        loop {
            if cancel.is_cancelled() {
                return Ok(SegmentStop::Cancelled);
            }
            if let Some(wait) = pacer.wait_needed() {
                if !sleep_or_cancel(wait, cancel).await {
                    return Ok(SegmentStop::Cancelled);
                }
                continue;
            }
            if phases.in_live_phase() {
                let resume = phases.next_replay_start();
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(SegmentStop::Cancelled),
                    _ = tokio::time::sleep_until(resume) => {}
                }
                continue;
            }
            break;
        }

        let payload = match zstd::decode_all(compressed.as_slice()) {
            Ok(payload) => bytes::Bytes::from(payload),
            Err(e) => {
                // The hash matched, so this is a writer bug rather than disk
                // corruption; skip the record instead of wedging the session.
                warn!(segment = %segment.path.display(), error = %e, "record failed to decompress");
                store.metrics().dlq_replay_discarded_total.inc();
                continue;
            }
        };

        if !send_with_backoff(sink, payload, store, cancel).await {
            return Ok(SegmentStop::Cancelled);
        }
        pacer.consume(on_disk);
    }
    Ok(SegmentStop::Done)
}

/// Sends one record, retrying transient failures until delivery, discard or
/// cancellation. Returns false when the session was cancelled.
async fn send_with_backoff(
    sink: &dyn ReplaySink,
    payload: bytes::Bytes,
    store: &SpillStore,
    cancel: &CancellationToken,
) -> bool {
    let base = store.replay_retry_base();
    let cap = store.replay_retry_cap();
    let mut attempt: u32 = 0;
    loop {
        let disposition = tokio::select! {
            _ = cancel.cancelled() => return false,
            disposition = sink.send(payload.clone()) => disposition,
        };
        match disposition {
            ReplayDisposition::Delivered => {
                store.metrics().dlq_replay_success_total.inc();
                return true;
            }
            ReplayDisposition::Discard => {
                store.metrics().dlq_replay_discarded_total.inc();
                return true;
            }
            ReplayDisposition::Retry => {
                let exp = base.as_secs_f64() * 2f64.powi(attempt.min(16) as i32);
                let capped = exp.min(cap.as_secs_f64());
                let jitter = rand::rng().random_range(0.8..1.2);
                let delay = Duration::from_secs_f64(capped * jitter);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "replay send failed, backing off");
                if !sleep_or_cancel(delay, cancel).await {
                    return false;
                }
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

/// Sleeps unless cancelled first; true means the sleep completed.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
