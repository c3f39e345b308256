// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Streaming cardinality limiter.
//!
//! For each arriving data point the limiter computes a cardinality-risk
//! score, then admits, aggregates (strips configured labels) or drops the
//! point. Admitted points are tracked in a bounded fingerprint table whose
//! occupancy is observable as the `keys_used` gauge.
//!
//! `process` never fails: over-limit conditions surface as dropped points
//! and counter increments, not errors. Invalid configuration is rejected by
//! the config layer before a limiter is built.

mod keytable;
mod metrics;
mod score;

use std::collections::HashMap;
use std::time::Instant;

use nrdq_config::{EvictionPolicy, LimiterConfig, ScorerKind};
use nrdq_pdata::{DataPoint, PointKind, attribute_fingerprint};
use tracing::{debug, info};

use keytable::{KeyTable, TouchOutcome};
use score::Scorer;

pub use metrics::LimiterMetrics;

/// One limiter instance. Owns its key table and scorer state; callers that
/// share an instance across threads wrap it in one exclusive section, which
/// keeps the hit/evict step atomic as required.
pub struct CardinalityLimiter {
    config: LimiterConfig,
    scorer: Scorer,
    table: KeyTable,
    metrics: LimiterMetrics,
}

impl CardinalityLimiter {
    /// Builds a limiter from validated configuration.
    #[must_use]
    pub fn new(config: LimiterConfig, metrics: LimiterMetrics) -> Self {
        info!(
            scorer = ?config.scorer,
            eviction_policy = ?config.eviction_policy,
            max_keys = config.max_keys,
            "cardinality limiter active"
        );
        let scorer = Scorer::new(config.scorer);
        let table = KeyTable::new(config.max_keys, config.eviction_policy);
        Self {
            config,
            scorer,
            table,
            metrics,
        }
    }

    /// Number of fingerprints currently tracked.
    #[must_use]
    pub fn keys_used(&self) -> usize {
        self.table.len()
    }

    /// Processes one batch in place: scores every point, applies the
    /// admit/aggregate/drop action, coalesces points made identical by label
    /// aggregation and maintains the key table. The returned batch is the
    /// same size or smaller.
    pub fn process(&mut self, batch: Vec<DataPoint>) -> Vec<DataPoint> {
        let mut out: Vec<DataPoint> = Vec::with_capacity(batch.len());
        // (metric, kind, fingerprint) → index in `out`, for coalescing.
        let mut seen: HashMap<(String, PointKind, u64), usize> = HashMap::new();
        let now = Instant::now();

        for mut point in batch {
            let score = self.scorer.score(&point);
            self.scorer.observe(&point);

            if self.config.critical_score < 1.0 && score >= self.config.critical_score {
                debug!(metric = %point.metric, score, "dropping high-cardinality point");
                self.metrics.dropped_samples_total.inc(&point.metric);
                continue;
            }

            let mut aggregated = false;
            if score >= self.config.high_score {
                let _ = point.remove_attributes(&self.config.aggregate_labels);
                aggregated = true;
                self.metrics.aggregated_samples_total.inc(&point.metric);
                debug!(metric = %point.metric, score, "aggregated point labels");
            }

            let fingerprint = attribute_fingerprint(&point.attributes);
            match self.table.touch(fingerprint, now) {
                TouchOutcome::Evicted => {
                    let policy = match self.config.eviction_policy {
                        EvictionPolicy::HeatLru => "heat-lru",
                        EvictionPolicy::Random => "random",
                    };
                    self.metrics.evictions_total.inc(policy);
                }
                TouchOutcome::Hit | TouchOutcome::Inserted => {}
            }
            self.metrics.keys_used.set(self.table.len() as u64);

            let key = (point.metric.clone(), point.kind, fingerprint);
            if aggregated {
                if let Some(&target) = seen.get(&key) {
                    merge_points(&mut out[target], &point);
                    continue;
                }
            }
            let next_index = out.len();
            let _ = seen.entry(key).or_insert(next_index);
            out.push(point);
        }
        out
    }

    /// The scorer kind this limiter runs with.
    #[must_use]
    pub fn scorer_kind(&self) -> ScorerKind {
        self.config.scorer
    }
}

/// Folds `point` into `target` after label aggregation made them identical.
fn merge_points(target: &mut DataPoint, point: &DataPoint) {
    match target.kind {
        PointKind::Sum => target.value += point.value,
        PointKind::Gauge => target.value = point.value,
    }
    target.timestamp_unix_nanos = target.timestamp_unix_nanos.max(point.timestamp_unix_nanos);
}
