// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Exporter contract and the replay-side adapter.

use async_trait::async_trait;
use bytes::Bytes;
use nrdq_dlq::{ReplayDisposition, ReplaySink};
use std::sync::Arc;

/// Result of one upstream send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The upstream accepted the payload.
    Accepted,
    /// The upstream is slow, overloaded or unreachable; the payload is worth
    /// retrying later.
    Transient(String),
    /// The upstream definitively rejected the payload; retrying cannot help.
    Permanent(String),
}

/// One attempt to deliver an opaque batch upstream. Implementations wrap the
/// external transport; they do not retry internally.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Sends one payload and classifies the result.
    async fn send(&self, payload: Bytes) -> SendOutcome;
}

/// Adapts an [`Exporter`] into the spill store's replay sink: transient
/// failures become retries, permanent ones discards.
pub struct ExporterReplaySink {
    exporter: Arc<dyn Exporter>,
}

impl ExporterReplaySink {
    /// Wraps an exporter for replay use.
    pub fn new(exporter: Arc<dyn Exporter>) -> Arc<Self> {
        Arc::new(Self { exporter })
    }
}

#[async_trait]
impl ReplaySink for ExporterReplaySink {
    async fn send(&self, payload: Bytes) -> ReplayDisposition {
        match self.exporter.send(payload).await {
            SendOutcome::Accepted => ReplayDisposition::Delivered,
            SendOutcome::Transient(_) => ReplayDisposition::Retry,
            SendOutcome::Permanent(_) => ReplayDisposition::Discard,
        }
    }
}
