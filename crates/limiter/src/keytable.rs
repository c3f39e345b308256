// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Bounded fingerprint table with sampled eviction.
//!
//! Entries live in a dense vector so eviction can sample uniformly without
//! walking the map; the map stores fingerprint → slot index and is repaired
//! after each `swap_remove`.

use std::collections::HashMap;
use std::time::Instant;

use nrdq_config::EvictionPolicy;
use rand::Rng;

/// Entries sampled per heat-weighted eviction.
const EVICTION_SAMPLE: usize = 8;

#[derive(Debug)]
struct Slot {
    fingerprint: u64,
    hits: u64,
    last_seen: Instant,
}

impl Slot {
    /// Heat is hit volume over idle time: frequently seen, recently seen
    /// entries are hot. The denominator floors at one second so brand new
    /// entries are not infinitely hot.
    fn heat(&self, now: Instant) -> f64 {
        let idle = now.duration_since(self.last_seen).as_secs_f64().max(1.0);
        self.hits as f64 / idle
    }
}

/// Result of recording one admitted point in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchOutcome {
    /// The fingerprint was already tracked.
    Hit,
    /// A new entry was created within capacity.
    Inserted,
    /// A new entry replaced an evicted one.
    Evicted,
}

/// Bounded mapping from attribute fingerprint to usage record.
#[derive(Debug)]
pub struct KeyTable {
    slots: Vec<Slot>,
    index: HashMap<u64, usize>,
    capacity: usize,
    policy: EvictionPolicy,
}

impl KeyTable {
    /// Creates a table bounded at `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize, policy: EvictionPolicy) -> Self {
        Self {
            slots: Vec::with_capacity(capacity.min(4096)),
            index: HashMap::new(),
            capacity,
            policy,
        }
    }

    /// Number of live entries. Never exceeds the configured capacity.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no entries are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Records one admitted point: bumps an existing entry or inserts a new
    /// one, evicting a victim when the table is full.
    pub fn touch(&mut self, fingerprint: u64, now: Instant) -> TouchOutcome {
        if let Some(&slot) = self.index.get(&fingerprint) {
            self.slots[slot].hits += 1;
            self.slots[slot].last_seen = now;
            return TouchOutcome::Hit;
        }

        let outcome = if self.slots.len() < self.capacity {
            TouchOutcome::Inserted
        } else {
            let victim = self.select_victim(now);
            self.remove_slot(victim);
            TouchOutcome::Evicted
        };

        let _ = self.index.insert(fingerprint, self.slots.len());
        self.slots.push(Slot {
            fingerprint,
            hits: 1,
            last_seen: now,
        });
        outcome
    }

    fn select_victim(&self, now: Instant) -> usize {
        let mut rng = rand::rng();
        match self.policy {
            EvictionPolicy::Random => rng.random_range(0..self.slots.len()),
            EvictionPolicy::HeatLru if self.slots.len() <= EVICTION_SAMPLE => {
                // Small table: examine everything, the sample would cover it
                // anyway.
                let mut victim = 0;
                let mut coldest = self.slots[0].heat(now);
                for (candidate, slot) in self.slots.iter().enumerate().skip(1) {
                    let heat = slot.heat(now);
                    if heat < coldest {
                        victim = candidate;
                        coldest = heat;
                    }
                }
                victim
            }
            EvictionPolicy::HeatLru => {
                let mut victim = rng.random_range(0..self.slots.len());
                let mut coldest = self.slots[victim].heat(now);
                for _ in 1..EVICTION_SAMPLE {
                    let candidate = rng.random_range(0..self.slots.len());
                    let heat = self.slots[candidate].heat(now);
                    if heat < coldest {
                        victim = candidate;
                        coldest = heat;
                    }
                }
                victim
            }
        }
    }

    fn remove_slot(&mut self, slot: usize) {
        let removed = self.slots.swap_remove(slot);
        let _ = self.index.remove(&removed.fingerprint);
        // swap_remove moved the former tail into `slot`; repair its index.
        if slot < self.slots.len() {
            let moved = self.slots[slot].fingerprint;
            let _ = self.index.insert(moved, slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_never_exceeds_capacity() {
        let mut table = KeyTable::new(16, EvictionPolicy::HeatLru);
        let now = Instant::now();
        for fp in 0..1000u64 {
            let _ = table.touch(fp, now);
            assert!(table.len() <= 16);
        }
        assert_eq!(table.len(), 16);
    }

    #[test]
    fn repeated_touch_is_a_hit_not_an_insert() {
        let mut table = KeyTable::new(4, EvictionPolicy::HeatLru);
        let now = Instant::now();
        assert_eq!(table.touch(7, now), TouchOutcome::Inserted);
        assert_eq!(table.touch(7, now), TouchOutcome::Hit);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn heat_lru_prefers_evicting_cold_entries() {
        let mut table = KeyTable::new(8, EvictionPolicy::HeatLru);
        let now = Instant::now();
        for fp in 0..8u64 {
            let _ = table.touch(fp, now);
        }
        // Make entries 1..8 much hotter than entry 0.
        for _ in 0..50 {
            for fp in 1..8u64 {
                let _ = table.touch(fp, now);
            }
        }
        // With a sample of 8 out of 8, the minimum-heat entry is always
        // found, so the single cold entry is the deterministic victim.
        assert_eq!(table.touch(100, now), TouchOutcome::Evicted);
        assert_eq!(table.touch(0, now), TouchOutcome::Evicted);
        for fp in 1..8u64 {
            assert_eq!(table.touch(fp, now), TouchOutcome::Hit, "lost hot key {fp}");
        }
    }

    #[test]
    fn index_survives_swap_remove_repair() {
        let mut table = KeyTable::new(3, EvictionPolicy::Random);
        let now = Instant::now();
        for fp in [10, 20, 30u64] {
            let _ = table.touch(fp, now);
        }
        for fp in 40..200u64 {
            let _ = table.touch(fp, now);
            // Whatever survived must still be findable as a hit.
            let survivor = table.slots[0].fingerprint;
            assert_eq!(table.touch(survivor, now), TouchOutcome::Hit);
        }
    }
}
