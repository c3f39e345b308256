// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! CBOR batch codec.
//!
//! A batch leaves the limiter as `Vec<DataPoint>` and travels through the
//! queue, the spill store and the exporter as opaque bytes. CBOR keeps the
//! encoding self-describing without a schema registry.

use bytes::Bytes;

use crate::Error;
use crate::point::DataPoint;

/// Encodes a batch into its opaque payload form.
pub fn encode_batch(batch: &[DataPoint]) -> Result<Bytes, Error> {
    let mut buf = Vec::new();
    ciborium::into_writer(&batch, &mut buf).map_err(|e| Error::Encode {
        details: e.to_string(),
    })?;
    Ok(Bytes::from(buf))
}

/// Decodes an opaque payload back into a batch.
pub fn decode_batch(payload: &[u8]) -> Result<Vec<DataPoint>, Error> {
    ciborium::from_reader(payload).map_err(|e| Error::Decode {
        details: e.to_string(),
    })
}
