// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Counter and gauge instruments.
//!
//! Instruments are cheaply cloneable handles over shared atomics; cloning a
//! metric set and handing one copy to a component and one to a test observes
//! the same values.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter.
#[derive(Debug, Default, Clone)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    /// Adds `n` to the counter.
    pub fn add(&self, n: u64) {
        let _ = self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Increments the counter by one.
    pub fn inc(&self) {
        self.add(1);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Last-value gauge for integral quantities.
#[derive(Debug, Default, Clone)]
pub struct Gauge {
    value: Arc<AtomicU64>,
}

impl Gauge {
    /// Sets the gauge to `v`.
    pub fn set(&self, v: u64) {
        self.value.store(v, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Last-value gauge for ratios and other fractional quantities.
///
/// Stored as the bit pattern of an `f64` inside an atomic word.
#[derive(Debug, Default, Clone)]
pub struct GaugeF64 {
    bits: Arc<AtomicU64>,
}

impl GaugeF64 {
    /// Sets the gauge to `v`.
    pub fn set(&self, v: f64) {
        self.bits.store(v.to_bits(), Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Counter partitioned by a single label value (e.g. metric name or class).
///
/// Label cardinality is bounded by the caller: the limiter keys by metric
/// name after its own admission control, the queue keys by its fixed class
/// list.
#[derive(Debug, Default, Clone)]
pub struct KeyedCounter {
    values: Arc<Mutex<HashMap<String, u64>>>,
}

impl KeyedCounter {
    /// Adds `n` to the series identified by `key`.
    pub fn add(&self, key: &str, n: u64) {
        let mut values = self.values.lock();
        match values.get_mut(key) {
            Some(v) => *v += n,
            None => {
                let _ = values.insert(key.to_owned(), n);
            }
        }
    }

    /// Increments the series identified by `key` by one.
    pub fn inc(&self, key: &str) {
        self.add(key, 1);
    }

    /// Current value for `key`, zero if the series was never touched.
    #[must_use]
    pub fn get(&self, key: &str) -> u64 {
        self.values.lock().get(key).copied().unwrap_or(0)
    }

    /// Sum across all series.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.values.lock().values().sum()
    }

    /// Snapshot of all series, sorted by label for stable output.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let mut out: Vec<_> = self
            .values
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates_across_clones() {
        let c = Counter::default();
        let c2 = c.clone();
        c.add(3);
        c2.inc();
        assert_eq!(c.get(), 4);
        assert_eq!(c2.get(), 4);
    }

    #[test]
    fn gauge_f64_round_trips() {
        let g = GaugeF64::default();
        g.set(0.35);
        assert!((g.get() - 0.35).abs() < f64::EPSILON);
    }

    #[test]
    fn keyed_counter_partitions_by_label() {
        let c = KeyedCounter::default();
        c.inc("a");
        c.add("b", 2);
        c.inc("a");
        assert_eq!(c.get("a"), 2);
        assert_eq!(c.get("b"), 2);
        assert_eq!(c.get("missing"), 0);
        assert_eq!(c.total(), 4);
        assert_eq!(
            c.snapshot(),
            vec![("a".to_owned(), 2), ("b".to_owned(), 2)]
        );
    }
}
