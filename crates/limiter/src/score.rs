// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-point cardinality-risk scoring.
//!
//! Two scorers share the `[0, 1]` score range and the monotonicity contract
//! (more attributes never lowers the score, all else equal):
//!
//! - [`Scorer::Entropy`] keeps a fixed-size value reservoir per attribute key
//!   and scores a point by the normalised Shannon entropy of its keys'
//!   observed value spread. High-entropy keys (request ids, pod hashes) push
//!   points toward aggregation or drop; stable keys contribute nothing.
//! - [`Scorer::AttributeBytes`] is the stateless fallback: label volume as a
//!   proxy for risk.

use std::collections::HashMap;

use nrdq_config::ScorerKind;
use nrdq_pdata::DataPoint;
use rand::Rng;

/// Reservoir capacity per attribute key.
const RESERVOIR_CAPACITY: usize = 1024;

/// Upper bound on distinct attribute keys the entropy scorer tracks. Keys
/// beyond the bound score zero, keeping scorer state finite even when key
/// names themselves explode.
const MAX_TRACKED_KEYS: usize = 4096;

/// Sum of per-key entropies mapping to a score of 1.0.
const ENTROPY_DAMPING: f64 = 4.0;

/// Fixed-size value sample for one attribute key, with a histogram kept in
/// sync for entropy computation. Replacement is uniform-random, so the
/// histogram approximates the long-run value distribution.
#[derive(Debug, Default)]
pub(crate) struct KeyReservoir {
    samples: Vec<String>,
    histogram: HashMap<String, u32>,
}

impl KeyReservoir {
    fn observe(&mut self, value: String) {
        if self.samples.len() < RESERVOIR_CAPACITY {
            *self.histogram.entry(value.clone()).or_insert(0) += 1;
            self.samples.push(value);
            return;
        }
        let slot = rand::rng().random_range(0..RESERVOIR_CAPACITY);
        let evicted = std::mem::replace(&mut self.samples[slot], value.clone());
        if let Some(count) = self.histogram.get_mut(&evicted) {
            *count -= 1;
            if *count == 0 {
                let _ = self.histogram.remove(&evicted);
            }
        }
        *self.histogram.entry(value).or_insert(0) += 1;
    }

    /// Shannon entropy of the sampled values, normalised to `[0, 1]` by the
    /// maximum entropy of a sample of this size.
    fn normalized_entropy(&self) -> f64 {
        let n = self.samples.len();
        if n <= 1 {
            return 0.0;
        }
        let n_f = n as f64;
        let entropy: f64 = self
            .histogram
            .values()
            .map(|&count| {
                let p = f64::from(count) / n_f;
                -p * p.ln()
            })
            .sum();
        (entropy / n_f.ln()).clamp(0.0, 1.0)
    }
}

/// The active scorer and its state.
#[derive(Debug)]
pub(crate) enum Scorer {
    /// Entropy-proportional scoring over per-key reservoirs.
    Entropy {
        /// Reservoir per tracked attribute key.
        keys: HashMap<String, KeyReservoir>,
    },
    /// Stateless byte-volume heuristic.
    AttributeBytes,
}

impl Scorer {
    /// Builds the scorer selected by configuration.
    #[must_use]
    pub(crate) fn new(kind: ScorerKind) -> Self {
        match kind {
            ScorerKind::Entropy => Self::Entropy {
                keys: HashMap::new(),
            },
            ScorerKind::AttributeBytes => Self::AttributeBytes,
        }
    }

    /// Scores a point against the spread observed so far. The point itself
    /// is not yet part of the observed state; call [`Scorer::observe`]
    /// afterwards.
    #[must_use]
    pub(crate) fn score(&self, point: &DataPoint) -> f64 {
        match self {
            Self::Entropy { keys } => {
                let sum: f64 = point
                    .attributes
                    .iter()
                    .map(|(key, _)| {
                        keys.get(key)
                            .map_or(0.0, KeyReservoir::normalized_entropy)
                    })
                    .sum();
                (sum / ENTROPY_DAMPING).clamp(0.0, 1.0)
            }
            Self::AttributeBytes => {
                let bytes: usize = point
                    .attributes
                    .iter()
                    .map(|(key, value)| key.len() + value.text_len())
                    .sum();
                let denominator = 100.0 + 5.0 * point.attributes.len() as f64;
                (bytes as f64 / denominator).clamp(0.0, 1.0)
            }
        }
    }

    /// Feeds a point's attributes into the scorer state.
    pub(crate) fn observe(&mut self, point: &DataPoint) {
        let Self::Entropy { keys } = self else {
            return;
        };
        for (key, value) in &point.attributes {
            if let Some(reservoir) = keys.get_mut(key) {
                reservoir.observe(value.canonical());
            } else if keys.len() < MAX_TRACKED_KEYS {
                let mut reservoir = KeyReservoir::default();
                reservoir.observe(value.canonical());
                let _ = keys.insert(key.clone(), reservoir);
            }
        }
    }
}
