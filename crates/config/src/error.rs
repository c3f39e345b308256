// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the config crate.

/// Errors that can occur while loading or validating the relay configuration.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A collection of errors found while validating the configuration.
    #[error("Invalid configuration: {errors:?}")]
    InvalidConfiguration {
        /// Every validation error found, not just the first one.
        errors: Vec<Error>,
    },

    /// An error that occurred while reading a configuration file.
    #[error("Failed to read config file `{path}`: {details}")]
    FileReadError {
        /// Path of the file that could not be read.
        path: String,
        /// A description of the error that occurred.
        details: String,
    },

    /// An error that occurred while deserializing a configuration file.
    #[error("YAML deserialization error: {details}")]
    DeserializationError {
        /// A description of the error that occurred.
        details: String,
    },

    /// A score threshold is negative or not a number.
    #[error("Invalid value for `{field}`: {value} (thresholds must be finite and >= 0)")]
    InvalidThreshold {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// A numeric field is outside its allowed range.
    #[error("Invalid value for `{field}`: {details}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        details: String,
    },

    /// The priority class list is empty.
    #[error("`queue.classes` must contain at least one class")]
    EmptyClassList,

    /// A priority class is misconfigured.
    #[error("Invalid class `{name}`: {details}")]
    InvalidClass {
        /// Name of the offending class.
        name: String,
        /// Why the class was rejected.
        details: String,
    },

    /// Two priority classes share a name.
    #[error("Duplicated class name `{name}`")]
    DuplicateClass {
        /// The duplicated name.
        name: String,
    },
}
