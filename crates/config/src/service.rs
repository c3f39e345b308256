// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Exporter, shutdown and ingest settings for the host process.

use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_concurrency() -> usize {
    4
}

fn default_drain_deadline() -> Duration {
    Duration::from_secs(10)
}

fn default_listen() -> String {
    "127.0.0.1:4318".to_owned()
}

/// Exporter transport settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterSettings {
    /// Upstream endpoint receiving batch payloads.
    pub endpoint: String,

    /// Per-send timeout.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    /// Number of concurrent dispatcher send workers.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl ExporterSettings {
    pub(crate) fn validate(&self, errors: &mut Vec<Error>) {
        if self.endpoint.is_empty() {
            errors.push(Error::InvalidValue {
                field: "exporter.endpoint",
                details: "must be non-empty".to_owned(),
            });
        }
        if self.concurrency == 0 {
            errors.push(Error::InvalidValue {
                field: "exporter.concurrency",
                details: "must be at least 1".to_owned(),
            });
        }
    }
}

/// Graceful shutdown settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShutdownSettings {
    /// How long the dispatcher may keep draining the queue before the
    /// remainder is spilled to disk.
    #[serde(with = "humantime_serde", default = "default_drain_deadline")]
    pub drain_deadline: Duration,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            drain_deadline: default_drain_deadline(),
        }
    }
}

/// Ingest front-end settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestSettings {
    /// Listen address for the HTTP ingest endpoint.
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}
