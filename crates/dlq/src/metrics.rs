// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Metrics for the durable spill store.

use nrdq_telemetry::{Counter, Gauge, GaugeF64};

/// Metric set owned by one store instance.
#[derive(Debug, Default, Clone)]
pub struct StoreMetrics {
    /// Bytes on disk across the active and sealed segments.
    pub dlq_size_bytes: Gauge,

    /// Age of the oldest stored segment, in seconds.
    pub dlq_oldest_age_seconds: Gauge,

    /// `dlq_size_bytes` over the configured capacity.
    pub dlq_utilization_ratio: GaugeF64,

    /// Records delivered by replay.
    pub dlq_replay_success_total: Counter,

    /// Records dropped during replay on a permanent upstream failure, plus
    /// records that failed to decompress out of a hash-valid segment.
    pub dlq_replay_discarded_total: Counter,

    /// Segments moved to quarantine after an integrity mismatch.
    pub dlq_corrupted_total: Counter,

    /// Crash survivors whose unparseable tail was discarded during recovery.
    pub dlq_recovered_truncated_total: Counter,
}
