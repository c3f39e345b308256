// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Priority queue settings.

use regex::Regex;
use serde::Deserialize;

use crate::error::Error;

fn default_capacity() -> usize {
    2000
}

fn default_classes() -> Vec<ClassConfig> {
    vec![
        ClassConfig {
            name: "critical".to_owned(),
            weight: 5,
            pattern: r"^system\.".to_owned(),
        },
        ClassConfig {
            name: "high".to_owned(),
            weight: 3,
            pattern: "severity>=30".to_owned(),
        },
        ClassConfig {
            name: "normal".to_owned(),
            weight: 1,
            pattern: ".*".to_owned(),
        },
    ]
}

/// One priority class. Order in the configuration is match order and the
/// scheduler's tie-break order; the last class is the fallback for payloads
/// no pattern matches.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassConfig {
    /// Class name, used as the metric label.
    pub name: String,
    /// Share of dequeues under sustained backlog, relative to other classes.
    pub weight: u32,
    /// Regular expression matched against the payload projection.
    pub pattern: String,
}

/// Priority queue settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Total item capacity across all classes.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Ordered class list.
    #[serde(default = "default_classes")]
    pub classes: Vec<ClassConfig>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            classes: default_classes(),
        }
    }
}

impl QueueConfig {
    pub(crate) fn validate(&self, errors: &mut Vec<Error>) {
        if self.capacity == 0 {
            errors.push(Error::InvalidValue {
                field: "queue.capacity",
                details: "must be at least 1".to_owned(),
            });
        }
        if self.classes.is_empty() {
            errors.push(Error::EmptyClassList);
            return;
        }
        let mut seen = std::collections::HashSet::new();
        for class in &self.classes {
            if class.weight == 0 {
                errors.push(Error::InvalidClass {
                    name: class.name.clone(),
                    details: "weight must be at least 1".to_owned(),
                });
            }
            if let Err(e) = Regex::new(&class.pattern) {
                errors.push(Error::InvalidClass {
                    name: class.name.clone(),
                    details: format!("invalid pattern: {e}"),
                });
            }
            if !seen.insert(class.name.clone()) {
                errors.push(Error::DuplicateClass {
                    name: class.name.clone(),
                });
            }
        }
    }
}
