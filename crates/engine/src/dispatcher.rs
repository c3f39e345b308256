// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Dispatcher: pulls from the queue, drives the exporter and gates replay on
//! upstream health.

use std::sync::Arc;

use bytes::Bytes;
use nrdq_dlq::{ReplaySink, SpillStore};
use nrdq_queue::PriorityQueue;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::exporter::{Exporter, SendOutcome};
use crate::health::{HealthWindow, Transition};
use crate::metrics::DispatcherMetrics;

/// Shared dispatcher state; workers hold it behind an `Arc`.
pub(crate) struct Dispatcher {
    queue: Arc<PriorityQueue>,
    store: Arc<SpillStore>,
    exporter: Arc<dyn Exporter>,
    replay_sink: Arc<dyn ReplaySink>,
    health: Mutex<HealthWindow>,
    metrics: DispatcherMetrics,
}

impl Dispatcher {
    pub(crate) fn new(
        queue: Arc<PriorityQueue>,
        store: Arc<SpillStore>,
        exporter: Arc<dyn Exporter>,
        replay_sink: Arc<dyn ReplaySink>,
        metrics: DispatcherMetrics,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue,
            store,
            exporter,
            replay_sink,
            health: Mutex::new(HealthWindow::new()),
            metrics,
        })
    }

    /// Spawns `concurrency` send workers sharing the queue and the health
    /// window.
    pub(crate) fn spawn_workers(
        self: &Arc<Self>,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        (0..concurrency)
            .map(|worker| {
                let dispatcher = Arc::clone(self);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    dispatcher.worker_loop(worker, cancel).await;
                })
            })
            .collect()
    }

    async fn worker_loop(self: Arc<Self>, worker: usize, cancel: CancellationToken) {
        debug!(worker, "dispatcher worker started");
        while let Some(item) = self.queue.dequeue(&cancel).await {
            let payload = item.payload;
            // A shutdown arriving mid-send must not lose the payload: spill
            // it and let replay deliver it later.
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    self.preserve_on_shutdown(&payload);
                    break;
                }
                outcome = self.exporter.send(payload.clone()) => outcome,
            };
            self.observe(&payload, outcome);
        }
        debug!(worker, "dispatcher worker stopped");
    }

    /// Applies one send outcome: counters, transient spill and health-driven
    /// replay gating.
    pub(crate) fn observe(&self, payload: &Bytes, outcome: SendOutcome) {
        match &outcome {
            SendOutcome::Accepted => {
                self.metrics.dispatch_sent_total.inc();
            }
            SendOutcome::Transient(reason) => {
                debug!(reason = %reason, "transient send failure, spilling payload");
                self.metrics.dispatch_transient_total.inc();
                match self.store.append(payload) {
                    Ok(()) => self.metrics.dispatch_requeued_total.inc(),
                    Err(e) => {
                        error!(error = %e, "durable store rejected a failed payload, dropping it");
                        self.metrics.dispatch_lost_total.inc();
                    }
                }
            }
            SendOutcome::Permanent(reason) => {
                warn!(reason = %reason, "permanent send failure, dropping payload");
                self.metrics.dispatch_permanent_total.inc();
            }
        }

        let transition = self.health.lock().record(&outcome);
        match transition {
            Some(Transition::BecameHealthy) => {
                info!("upstream healthy again, resuming replay");
                let _ = self.store.start_replay(Arc::clone(&self.replay_sink));
            }
            Some(Transition::BecameUnhealthy) => {
                info!("upstream unhealthy, pausing replay");
                self.store.stop_replay();
            }
            None => {}
        }
    }

    /// Kicks replay once at startup; recovered segments would otherwise wait
    /// for a health transition that may never come.
    pub(crate) fn kick_replay(&self) {
        if self.health.lock().is_healthy() && self.store.sealed_count() > 0 {
            let _ = self.store.start_replay(Arc::clone(&self.replay_sink));
        }
    }

    fn preserve_on_shutdown(&self, payload: &Bytes) {
        match self.store.append(payload) {
            Ok(()) => self.metrics.dispatch_requeued_total.inc(),
            Err(e) => {
                error!(error = %e, "failed to preserve in-flight payload at shutdown");
                self.metrics.dispatch_lost_total.inc();
            }
        }
    }
}
