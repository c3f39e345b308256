// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Metric sets for the dispatcher and the pipeline glue, plus the bundle the
//! host process hands out to every component.

use nrdq_dlq::StoreMetrics;
use nrdq_limiter::LimiterMetrics;
use nrdq_queue::QueueMetrics;
use nrdq_telemetry::Counter;

/// Metrics owned by the dispatcher workers.
#[derive(Debug, Default, Clone)]
pub struct DispatcherMetrics {
    /// Payloads accepted by the upstream.
    pub dispatch_sent_total: Counter,

    /// Transient send failures.
    pub dispatch_transient_total: Counter,

    /// Permanent send failures; the payload is dropped.
    pub dispatch_permanent_total: Counter,

    /// Payloads rerouted to the durable store after a transient failure.
    pub dispatch_requeued_total: Counter,

    /// Payloads lost because the durable store could not take them either.
    pub dispatch_lost_total: Counter,
}

/// Metrics owned by the pipeline glue.
#[derive(Debug, Default, Clone)]
pub struct PipelineMetrics {
    /// Batches accepted by `ingest`.
    pub ingest_batches_total: Counter,

    /// Data points surviving the limiter.
    pub ingest_points_total: Counter,

    /// Encoded batches neither the queue nor the spill sink could take.
    pub ingest_rejected_total: Counter,

    /// Items spilled to the store by the shutdown drain.
    pub shutdown_spilled_total: Counter,

    /// Items lost at shutdown because the store could not take them.
    pub shutdown_lost_total: Counter,
}

/// Every component's metric set, created once by the host and cloned into
/// the components at construction.
#[derive(Debug, Default, Clone)]
pub struct RelayMetrics {
    /// Cardinality limiter counters and gauges.
    pub limiter: LimiterMetrics,
    /// Priority queue counters and gauges.
    pub queue: QueueMetrics,
    /// Durable store counters and gauges.
    pub store: StoreMetrics,
    /// Dispatcher counters.
    pub dispatcher: DispatcherMetrics,
    /// Pipeline glue counters.
    pub pipeline: PipelineMetrics,
}
