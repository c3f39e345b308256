// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Cardinality limiter settings.

use serde::Deserialize;

use crate::error::Error;

fn default_max_keys() -> usize {
    65536
}

fn default_high_score() -> f64 {
    0.75
}

fn default_critical_score() -> f64 {
    0.90
}

/// Which per-point risk scorer is active.
///
/// The entropy scorer tracks per-key value spread in fixed reservoirs; the
/// attribute-bytes scorer derives the score from label volume alone. The
/// active scorer is logged at startup so operators know which behaviour they
/// are running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScorerKind {
    /// Normalised Shannon entropy over per-key value histograms (default).
    #[default]
    Entropy,
    /// Byte-volume heuristic: `clamp(bytes / (100 + 5 * count), 0, 1)`.
    AttributeBytes,
}

/// Eviction policy for the bounded key table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Sample 8 random entries, evict the coldest by hit rate (default).
    #[default]
    HeatLru,
    /// Evict a uniformly random entry. Counted separately so tests and
    /// operators can detect the degraded policy.
    Random,
}

/// Cardinality limiter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimiterConfig {
    /// Upper bound on tracked attribute-set fingerprints.
    #[serde(default = "default_max_keys")]
    pub max_keys: usize,

    /// Score at or above which points lose their `aggregate_labels` keys.
    #[serde(default = "default_high_score")]
    pub high_score: f64,

    /// Score at or above which points are dropped. A value of 1.0 (or more)
    /// disables dropping: scores are clamped to 1.0 and can never strictly
    /// exceed it.
    #[serde(default = "default_critical_score")]
    pub critical_score: f64,

    /// Attribute keys removed from high-scoring points, in order.
    #[serde(default)]
    pub aggregate_labels: Vec<String>,

    /// Key table eviction policy.
    #[serde(default)]
    pub eviction_policy: EvictionPolicy,

    /// Active risk scorer.
    #[serde(default)]
    pub scorer: ScorerKind,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_keys: default_max_keys(),
            high_score: default_high_score(),
            critical_score: default_critical_score(),
            aggregate_labels: Vec::new(),
            eviction_policy: EvictionPolicy::default(),
            scorer: ScorerKind::default(),
        }
    }
}

impl LimiterConfig {
    pub(crate) fn validate(&self, errors: &mut Vec<Error>) {
        if self.max_keys == 0 {
            errors.push(Error::InvalidValue {
                field: "limiter.max_keys",
                details: "must be at least 1".to_owned(),
            });
        }
        for (field, value) in [
            ("limiter.high_score", self.high_score),
            ("limiter.critical_score", self.critical_score),
        ] {
            if !value.is_finite() || value < 0.0 {
                errors.push(Error::InvalidThreshold { field, value });
            }
        }
    }
}
