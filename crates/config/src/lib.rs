// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Configuration model for the telemetry reliability relay.
//!
//! Configuration is a single YAML document with one section per component.
//! Durations accept humantime forms ("10m", "500ms"); byte sizes accept both
//! IEC ("128 MiB") and SI ("4 MB") units or raw byte counts. All options have
//! documented defaults except the spill directory and the exporter endpoint.
//!
//! Validation is fatal: the host process reports every error found and exits
//! with the configuration error code.

pub mod error;
pub mod limiter;
pub mod queue;
pub mod service;
pub mod spill;

use std::path::Path;

use serde::Deserialize;

pub use error::Error;
pub use limiter::{EvictionPolicy, LimiterConfig, ScorerKind};
pub use queue::{ClassConfig, QueueConfig};
pub use service::{ExporterSettings, IngestSettings, ShutdownSettings};
pub use spill::SpillConfig;

/// Root configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Cardinality limiter settings.
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Priority queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Durable spill store settings.
    pub spill: SpillConfig,

    /// Exporter transport settings.
    pub exporter: ExporterSettings,

    /// Graceful shutdown settings.
    #[serde(default)]
    pub shutdown: ShutdownSettings,

    /// Ingest front-end settings.
    #[serde(default)]
    pub ingest: IngestSettings,
}

impl RelayConfig {
    /// Parses a YAML document.
    pub fn from_yaml(input: &str) -> Result<Self, Error> {
        let config: Self =
            serde_yaml::from_str(input).map_err(|e| Error::DeserializationError {
                details: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a YAML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let input = std::fs::read_to_string(path).map_err(|e| Error::FileReadError {
            path: path.display().to_string(),
            details: e.to_string(),
        })?;
        Self::from_yaml(&input)
    }

    /// Validates the whole document, collecting every error found.
    pub fn validate(&self) -> Result<(), Error> {
        let mut errors = Vec::new();
        self.limiter.validate(&mut errors);
        self.queue.validate(&mut errors);
        self.spill.validate(&mut errors);
        self.exporter.validate(&mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidConfiguration { errors })
        }
    }
}
