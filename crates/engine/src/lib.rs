// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Pipeline engine: exporter contract, dispatcher, upstream health window
//! and the wiring that assembles limiter, queue and durable store into one
//! reliability stage.

mod dispatcher;
pub mod exporter;
pub mod health;
mod metrics;
mod pipeline;

pub use exporter::{Exporter, ExporterReplaySink, SendOutcome};
pub use health::{HealthWindow, Transition};
pub use metrics::{DispatcherMetrics, PipelineMetrics, RelayMetrics};
pub use pipeline::Pipeline;

/// Errors surfaced by the engine.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The queue could not be built from its configuration.
    #[error(transparent)]
    Queue(#[from] nrdq_queue::Error),

    /// The durable store failed, at startup or while sealing.
    #[error(transparent)]
    Store(#[from] nrdq_dlq::Error),

    /// A surviving batch could not be encoded.
    #[error(transparent)]
    Codec(#[from] nrdq_pdata::Error),

    /// `ingest` was called after shutdown began.
    #[error("the pipeline is shutting down")]
    ShuttingDown,
}
