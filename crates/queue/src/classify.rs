// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Payload-to-class matching.

use nrdq_config::ClassConfig;
use regex::Regex;

use crate::Error;

/// Compiled class patterns, matched in configuration order.
#[derive(Debug)]
pub(crate) struct ClassMatcher {
    patterns: Vec<Regex>,
}

impl ClassMatcher {
    pub(crate) fn new(classes: &[ClassConfig]) -> Result<Self, Error> {
        let patterns = classes
            .iter()
            .map(|class| {
                Regex::new(&class.pattern).map_err(|e| Error::InvalidPattern {
                    class: class.name.clone(),
                    details: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Index of the first class whose pattern matches the projection, or the
    /// last class when none does.
    pub(crate) fn classify(&self, projection: &str) -> usize {
        self.patterns
            .iter()
            .position(|pattern| pattern.is_match(projection))
            .unwrap_or_else(|| self.patterns.len() - 1)
    }
}
