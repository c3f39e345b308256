// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Metrics for the priority queue.

use nrdq_telemetry::{Gauge, KeyedCounter};

/// Metric set owned by one queue instance.
#[derive(Debug, Default, Clone)]
pub struct QueueMetrics {
    /// Items diverted to the spill sink, by class.
    pub apq_spill_total: KeyedCounter,

    /// Items the queue could not take: spill sink unset or failing, by class.
    pub apq_rejected_total: KeyedCounter,

    /// Current total occupancy.
    pub apq_size: Gauge,
}
