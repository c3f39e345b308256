// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Canonical attribute-set fingerprinting.

use xxhash_rust::xxh3::xxh3_64;

use crate::point::AttributeValue;

/// Computes the 64-bit identity of an attribute set.
///
/// Pairs are sorted lexicographically by key and hashed as
/// `key \x1f canonical-value \x1e ...`, so two attribute sets with equal
/// canonicalisation always produce the same fingerprint regardless of the
/// order the producer sent them in.
#[must_use]
pub fn attribute_fingerprint(attributes: &[(String, AttributeValue)]) -> u64 {
    let mut pairs: Vec<(&str, String)> = attributes
        .iter()
        .map(|(k, v)| (k.as_str(), v.canonical()))
        .collect();
    pairs.sort();

    let mut buf = Vec::with_capacity(attributes.len() * 16);
    for (key, value) in pairs {
        buf.extend_from_slice(key.as_bytes());
        buf.push(0x1f);
        buf.extend_from_slice(value.as_bytes());
        buf.push(0x1e);
    }
    xxh3_64(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::AttributeValue::{Bool, Int, Str};

    #[test]
    fn fingerprint_ignores_attribute_order() {
        let a = vec![
            ("host".to_owned(), Str("web-1".to_owned())),
            ("code".to_owned(), Int(200)),
            ("cached".to_owned(), Bool(true)),
        ];
        let b = vec![a[2].clone(), a[0].clone(), a[1].clone()];
        assert_eq!(attribute_fingerprint(&a), attribute_fingerprint(&b));
    }

    #[test]
    fn fingerprint_distinguishes_values_and_types() {
        let base = vec![("code".to_owned(), Int(200))];
        let other_value = vec![("code".to_owned(), Int(500))];
        let other_type = vec![("code".to_owned(), Str("200".to_owned()))];
        assert_ne!(
            attribute_fingerprint(&base),
            attribute_fingerprint(&other_value)
        );
        assert_ne!(
            attribute_fingerprint(&base),
            attribute_fingerprint(&other_type)
        );
    }

    #[test]
    fn empty_attribute_set_has_a_stable_fingerprint() {
        assert_eq!(attribute_fingerprint(&[]), attribute_fingerprint(&[]));
    }
}
