// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Metric data points and attribute values.

use serde::{Deserialize, Serialize};

/// Aggregation temporality of a point, driving coalescing semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    /// Additive measurement; coalescing sums values.
    Sum,
    /// Last-value measurement; coalescing keeps the most recent value.
    Gauge,
}

/// An attribute value: string, number or bool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A UTF-8 string.
    Str(String),
    /// A signed integer.
    Int(i64),
    /// A floating-point number.
    Double(f64),
    /// A boolean.
    Bool(bool),
}

impl AttributeValue {
    /// Canonical string projection used for fingerprinting and entropy
    /// tracking. Distinct types with the same textual form stay distinct
    /// (`Str("1")` vs `Int(1)`).
    #[must_use]
    pub fn canonical(&self) -> String {
        match self {
            Self::Str(s) => format!("s:{s}"),
            Self::Int(i) => format!("i:{i}"),
            Self::Double(d) => format!("d:{d}"),
            Self::Bool(b) => format!("b:{b}"),
        }
    }

    /// Length in bytes of the raw textual form, used by the byte-volume
    /// scorer.
    #[must_use]
    pub fn text_len(&self) -> usize {
        match self {
            Self::Str(s) => s.len(),
            Self::Int(i) => i.to_string().len(),
            Self::Double(d) => d.to_string().len(),
            Self::Bool(b) => if *b { 4 } else { 5 },
        }
    }
}

/// One metric data point.
///
/// Attributes are an ordered mapping; keys are unique within a point (the
/// ingest boundary is responsible for deduplication).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Metric name.
    pub metric: String,
    /// Aggregation kind.
    pub kind: PointKind,
    /// Measurement value.
    pub value: f64,
    /// Event time in Unix nanoseconds.
    pub timestamp_unix_nanos: u64,
    /// Ordered attribute pairs.
    #[serde(default)]
    pub attributes: Vec<(String, AttributeValue)>,
}

impl DataPoint {
    /// Removes every attribute whose key is in `keys`. Returns true when at
    /// least one attribute was removed.
    pub fn remove_attributes(&mut self, keys: &[String]) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|(k, _)| !keys.contains(k));
        self.attributes.len() != before
    }
}
