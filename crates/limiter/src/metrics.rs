// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Metrics for the cardinality limiter.

use nrdq_telemetry::{Gauge, KeyedCounter};

/// Metric set owned by one limiter instance.
#[derive(Debug, Default, Clone)]
pub struct LimiterMetrics {
    /// Points dropped for exceeding the critical score, by metric name.
    pub dropped_samples_total: KeyedCounter,

    /// Points whose labels were aggregated away, by metric name.
    pub aggregated_samples_total: KeyedCounter,

    /// Live entries in the key table.
    pub keys_used: Gauge,

    /// Key table evictions, by eviction policy.
    pub evictions_total: KeyedCounter,
}
