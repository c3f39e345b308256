// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Telemetry data model for the relay.
//!
//! The limiter operates on decoded [`DataPoint`]s; everything downstream of
//! it (queue, spill store, exporter) carries the CBOR-encoded batch as opaque
//! bytes. Attribute identity is a 64-bit fingerprint over the canonicalised
//! attribute set.

pub mod codec;
pub mod fingerprint;
pub mod point;

pub use codec::{decode_batch, encode_batch};
pub use fingerprint::attribute_fingerprint;
pub use point::{AttributeValue, DataPoint, PointKind};

/// Errors produced by the batch codec.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A batch could not be serialized to CBOR.
    #[error("batch encode error: {details}")]
    Encode {
        /// A description of the error that occurred.
        details: String,
    },

    /// A payload could not be parsed as a CBOR batch.
    #[error("batch decode error: {details}")]
    Decode {
        /// A description of the error that occurred.
        details: String,
    },
}
