// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Pipeline wiring and lifecycle.
//!
//! `Pipeline` owns the limiter, the queue, the store and the dispatcher, and
//! binds the queue's spill sink to the store's append. Ingest runs the
//! limiter under one exclusive section per batch, encodes the survivors and
//! enqueues them under the first point's metric-name projection.
//!
//! Shutdown follows a fixed sequence: refuse new ingest, drain the queue up
//! to a deadline, spill whatever is left, stop replay and verification, and
//! seal the active segment.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nrdq_config::RelayConfig;
use nrdq_dlq::SpillStore;
use nrdq_limiter::CardinalityLimiter;
use nrdq_pdata::{DataPoint, encode_batch};
use nrdq_queue::{EnqueueOutcome, PriorityQueue};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::Error;
use crate::dispatcher::Dispatcher;
use crate::exporter::{Exporter, ExporterReplaySink};
use crate::metrics::RelayMetrics;

/// The assembled reliability stage.
pub struct Pipeline {
    limiter: Mutex<CardinalityLimiter>,
    queue: Arc<PriorityQueue>,
    store: Arc<SpillStore>,
    dispatcher: Arc<Dispatcher>,
    accepting: AtomicBool,
    cancel_dispatch: CancellationToken,
    cancel_verify: CancellationToken,
    drain_deadline: Duration,
    concurrency: usize,
    workers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    metrics: RelayMetrics,
}

impl Pipeline {
    /// Builds every component from validated configuration and wires the
    /// spill path. Fails on unbuildable queue configuration or a store
    /// directory that cannot be opened.
    pub fn build(
        config: &RelayConfig,
        exporter: Arc<dyn Exporter>,
        metrics: RelayMetrics,
    ) -> Result<Self, Error> {
        let limiter = CardinalityLimiter::new(config.limiter.clone(), metrics.limiter.clone());
        let queue = Arc::new(PriorityQueue::new(&config.queue, metrics.queue.clone())?);
        let store = Arc::new(SpillStore::open(
            config.spill.clone(),
            metrics.store.clone(),
        )?);

        let sink_store = Arc::clone(&store);
        queue.set_spill_sink(move |payload| {
            sink_store
                .append(payload)
                .map_err(|e| nrdq_queue::Error::SpillSink {
                    details: e.to_string(),
                })
        });

        let replay_sink = ExporterReplaySink::new(Arc::clone(&exporter));
        let dispatcher = Dispatcher::new(
            Arc::clone(&queue),
            Arc::clone(&store),
            exporter,
            replay_sink,
            metrics.dispatcher.clone(),
        );

        Ok(Self {
            limiter: Mutex::new(limiter),
            queue,
            store,
            dispatcher,
            accepting: AtomicBool::new(true),
            cancel_dispatch: CancellationToken::new(),
            cancel_verify: CancellationToken::new(),
            drain_deadline: config.shutdown.drain_deadline,
            concurrency: config.exporter.concurrency,
            workers: Mutex::new(Vec::new()),
            metrics,
        })
    }

    /// Starts the dispatcher workers and the verification ticker, and kicks
    /// replay once for segments recovered at startup. Must run inside a
    /// tokio runtime.
    pub fn start(&self) {
        let workers = self
            .dispatcher
            .spawn_workers(self.concurrency, &self.cancel_dispatch);
        *self.workers.lock() = workers;
        let _ = self.store.spawn_verifier(self.cancel_verify.clone());
        self.dispatcher.kick_replay();
        info!(workers = self.concurrency, "pipeline started");
    }

    /// Runs one batch through the limiter and into the queue. Individual
    /// points may be aggregated or dropped; the batch itself only fails when
    /// the pipeline is already shutting down.
    pub fn ingest(&self, batch: Vec<DataPoint>) -> Result<(), Error> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        self.metrics.pipeline.ingest_batches_total.inc();

        let processed = self.limiter.lock().process(batch);
        if processed.is_empty() {
            return Ok(());
        }
        self.metrics
            .pipeline
            .ingest_points_total
            .add(processed.len() as u64);

        let projection = processed[0].metric.clone();
        let payload = encode_batch(&processed)?;
        match self.queue.enqueue(payload, &projection) {
            EnqueueOutcome::Enqueued | EnqueueOutcome::Spilled => Ok(()),
            EnqueueOutcome::Rejected => {
                // The queue kept nothing and the sink refused; count the loss
                // and keep the pipeline running.
                self.metrics.pipeline.ingest_rejected_total.inc();
                Ok(())
            }
        }
    }

    /// Current queue occupancy, for observability surfaces.
    #[must_use]
    pub fn queue_size(&self) -> usize {
        self.queue.size()
    }

    /// The store, for observability surfaces.
    #[must_use]
    pub fn store(&self) -> &Arc<SpillStore> {
        &self.store
    }

    /// Graceful shutdown: drain, spill the remainder, stop the background
    /// workers, seal the store.
    pub async fn shutdown(&self) -> Result<(), Error> {
        info!("shutdown: refusing new ingest");
        self.accepting.store(false, Ordering::SeqCst);

        let deadline = tokio::time::Instant::now() + self.drain_deadline;
        while self.queue.size() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        let undrained = self.queue.size();
        if undrained > 0 {
            warn!(undrained, "drain deadline reached with items still queued");
        }

        self.cancel_dispatch.cancel();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "dispatcher worker ended abnormally");
            }
        }

        // Spill everything the dispatcher did not get to.
        for item in self.queue.drain_all() {
            match self.store.append(&item.payload) {
                Ok(()) => self.metrics.pipeline.shutdown_spilled_total.inc(),
                Err(e) => {
                    error!(error = %e, "failed to spill a queued item at shutdown");
                    self.metrics.pipeline.shutdown_lost_total.inc();
                }
            }
        }

        self.store.stop_replay();
        self.cancel_verify.cancel();
        self.store.close()?;
        info!("shutdown complete");
        Ok(())
    }
}
