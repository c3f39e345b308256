// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Metric instruments for the relay components.
//!
//! Components own a metric-set struct built from these instruments and
//! receive it at construction time, so tests can hold a clone and assert
//! counter values without any process-global registry. Exporting the values
//! to an operator-facing backend is a concern of the host process, which can
//! walk the snapshots.

pub mod instrument;

pub use instrument::{Counter, Gauge, GaugeF64, KeyedCounter};
