// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Durable spill store settings.

use std::path::PathBuf;
use std::time::Duration;

use byte_unit::{Byte, Unit};
use serde::Deserialize;

use crate::error::Error;

fn default_max_segment_bytes() -> Byte {
    Byte::from_u64_with_unit(128, Unit::MiB).expect("valid constant")
}

fn default_max_total_bytes() -> Byte {
    Byte::from_u64_with_unit(15, Unit::GiB).expect("valid constant")
}

fn default_verification_interval() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_replay_rate() -> Byte {
    Byte::from_u64_with_unit(4, Unit::MiB).expect("valid constant")
}

fn default_replay_retry_base() -> Duration {
    Duration::from_secs(1)
}

fn default_replay_retry_cap() -> Duration {
    Duration::from_secs(30)
}

/// Durable spill store settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpillConfig {
    /// Directory holding segment files. Created on startup; an unwritable
    /// directory is a fatal startup I/O error.
    pub directory: PathBuf,

    /// Size at which the active segment is sealed and rotated.
    #[serde(default = "default_max_segment_bytes")]
    pub max_segment_bytes: Byte,

    /// Nominal store capacity; drives the utilization gauge only.
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: Byte,

    /// Interval between background integrity sweeps over sealed segments.
    #[serde(with = "humantime_serde", default = "default_verification_interval")]
    pub verification_interval: Duration,

    /// Replay throughput ceiling.
    #[serde(default = "default_replay_rate")]
    pub replay_rate_bytes_per_sec: Byte,

    /// Base delay for retrying a failed replay send.
    #[serde(with = "humantime_serde", default = "default_replay_retry_base")]
    pub replay_retry_base: Duration,

    /// Ceiling for the replay retry backoff.
    #[serde(with = "humantime_serde", default = "default_replay_retry_cap")]
    pub replay_retry_cap: Duration,
}

impl SpillConfig {
    /// Segment rotation threshold in bytes.
    #[must_use]
    pub fn max_segment_bytes(&self) -> u64 {
        self.max_segment_bytes.as_u64()
    }

    /// Nominal capacity in bytes.
    #[must_use]
    pub fn max_total_bytes(&self) -> u64 {
        self.max_total_bytes.as_u64()
    }

    /// Replay rate in bytes per second.
    #[must_use]
    pub fn replay_rate_bytes_per_sec(&self) -> u64 {
        self.replay_rate_bytes_per_sec.as_u64()
    }

    pub(crate) fn validate(&self, errors: &mut Vec<Error>) {
        // The header alone is 46 bytes; a rotation threshold that small would
        // seal before the first record.
        if self.max_segment_bytes() < 1024 {
            errors.push(Error::InvalidValue {
                field: "spill.max_segment_bytes",
                details: "must be at least 1 KiB".to_owned(),
            });
        }
        if self.max_total_bytes() == 0 {
            errors.push(Error::InvalidValue {
                field: "spill.max_total_bytes",
                details: "must be non-zero".to_owned(),
            });
        }
        if self.replay_rate_bytes_per_sec() == 0 {
            errors.push(Error::InvalidValue {
                field: "spill.replay_rate_bytes_per_sec",
                details: "must be non-zero".to_owned(),
            });
        }
        if self.verification_interval.is_zero() {
            errors.push(Error::InvalidValue {
                field: "spill.verification_interval",
                details: "must be non-zero".to_owned(),
            });
        }
        if self.replay_retry_base.is_zero() || self.replay_retry_cap < self.replay_retry_base {
            errors.push(Error::InvalidValue {
                field: "spill.replay_retry_base",
                details: "base must be non-zero and no larger than the cap".to_owned(),
            });
        }
    }
}
