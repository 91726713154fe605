// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Record field classification into InfluxDB tags and values.
//!
//! Policy, in order of precedence:
//! 1. explicit tag keys: named fields are tag candidates
//! 2. auto tagging: string-typed fields are tag candidates
//! 3. neither: every field is a value
//!
//! Tag candidates that are blank (empty after trimming, or null) are dropped
//! entirely rather than kept as empty tags or pushed back into the values.

use crate::influx::FieldValue;
use crate::value::{Record, Value};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Which fields become tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TagPolicy {
    /// No tags; every field is a value.
    #[default]
    None,
    /// String-typed fields become tags.
    Auto,
    /// Fields whose name is in the set become tags.
    Keys(HashSet<String>),
}

impl TagPolicy {
    /// Resolve the policy from configuration. A non-empty key list wins over
    /// auto tagging.
    pub fn new(tag_keys: &[String], auto_tags: bool) -> Self {
        if !tag_keys.is_empty() {
            Self::Keys(tag_keys.iter().cloned().collect())
        } else if auto_tags {
            Self::Auto
        } else {
            Self::None
        }
    }

    fn is_tag_candidate(&self, key: &str, value: &Value) -> bool {
        match self {
            Self::None => false,
            Self::Auto => matches!(value, Value::String(_)),
            Self::Keys(keys) => keys.contains(key),
        }
    }
}

/// Result of classifying one record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classified {
    /// Value fields.
    pub values: IndexMap<String, FieldValue>,
    /// Tag fields.
    pub tags: IndexMap<String, FieldValue>,
}

/// Splits records into tags and values.
#[derive(Debug, Clone, Default)]
pub struct FieldClassifier {
    policy: TagPolicy,
    cast_number_to_float: bool,
}

impl FieldClassifier {
    /// Create a classifier.
    ///
    /// With `cast_number_to_float`, integer values (never tags) are written
    /// as floats so a series does not mix integer and float columns.
    pub fn new(policy: TagPolicy, cast_number_to_float: bool) -> Self {
        Self {
            policy,
            cast_number_to_float,
        }
    }

    /// The active tag policy.
    pub fn policy(&self) -> &TagPolicy {
        &self.policy
    }

    /// Partition `record` into values and tags.
    ///
    /// Null values and nested arrays/maps have no point representation and
    /// are skipped.
    pub fn classify(&self, record: Record) -> Classified {
        let mut out = Classified::default();

        for (key, value) in record {
            if self.policy.is_tag_candidate(&key, &value) {
                if value.is_blank() {
                    continue;
                }
                match FieldValue::from_value(value) {
                    Some(tag) => {
                        out.tags.insert(key, tag);
                    }
                    None => tracing::debug!(field = %key, "skipping non-scalar tag"),
                }
                continue;
            }

            if !value.is_scalar() {
                tracing::debug!(field = %key, kind = value.type_name(), "skipping nested value");
                continue;
            }
            match FieldValue::from_value(value) {
                Some(FieldValue::Integer(i)) if self.cast_number_to_float => {
                    out.values.insert(key, FieldValue::Float(i as f64));
                }
                Some(field) => {
                    out.values.insert(key, field);
                }
                None => {}
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_policy_precedence() {
        assert_eq!(TagPolicy::new(&[], false), TagPolicy::None);
        assert_eq!(TagPolicy::new(&[], true), TagPolicy::Auto);
        assert!(matches!(
            TagPolicy::new(&keys(&["b"]), true),
            TagPolicy::Keys(_)
        ));
    }

    #[test]
    fn test_classify_no_tags() {
        let classifier = FieldClassifier::default();
        let out = classifier.classify(record(&[("a", Value::Integer(1)), ("s", Value::from("x"))]));
        assert!(out.tags.is_empty());
        assert_eq!(out.values.len(), 2);
        assert_eq!(out.values["a"], FieldValue::Integer(1));
        assert_eq!(out.values["s"], FieldValue::String("x".into()));
    }

    #[test]
    fn test_classify_tag_keys_drop_blank() {
        let classifier = FieldClassifier::new(TagPolicy::new(&keys(&["b"]), false), false);

        let out = classifier.classify(record(&[("a", Value::Integer(1)), ("b", Value::from(""))]));
        assert_eq!(out.values.len(), 1);
        assert!(out.tags.is_empty());

        let out = classifier.classify(record(&[("a", Value::Integer(2)), ("b", Value::Integer(1))]));
        assert_eq!(out.values["a"], FieldValue::Integer(2));
        assert_eq!(out.tags["b"], FieldValue::Integer(1));

        let out = classifier.classify(record(&[("a", Value::Integer(3)), ("b", Value::from(" "))]));
        assert_eq!(out.values.len(), 1);
        assert!(!out.values.contains_key("b"));
        assert!(out.tags.is_empty());
    }

    #[test]
    fn test_classify_auto_tags() {
        let classifier = FieldClassifier::new(TagPolicy::Auto, false);

        let out = classifier.classify(record(&[("a", Value::Integer(1)), ("b", Value::from("1"))]));
        assert_eq!(out.tags["b"], FieldValue::String("1".into()));
        assert!(!out.values.contains_key("b"));

        let out = classifier.classify(record(&[("a", Value::Integer(2)), ("b", Value::Integer(1))]));
        assert!(out.tags.is_empty());
        assert_eq!(out.values["b"], FieldValue::Integer(1));

        let out = classifier.classify(record(&[("a", Value::Integer(3)), ("b", Value::from(" "))]));
        assert!(out.tags.is_empty());
        assert_eq!(out.values.len(), 1);
    }

    #[test]
    fn test_classify_only_tags_leaves_no_values() {
        let classifier = FieldClassifier::new(TagPolicy::new(&keys(&["b"]), false), false);
        let out = classifier.classify(record(&[("b", Value::from("3"))]));
        assert!(out.values.is_empty());
        assert_eq!(out.tags.len(), 1);
    }

    #[test]
    fn test_classify_cast_number_to_float() {
        let classifier = FieldClassifier::new(TagPolicy::new(&keys(&["host"]), false), true);
        let out = classifier.classify(record(&[
            ("n", Value::Integer(5)),
            ("f", Value::Float(1.5)),
            ("host", Value::Integer(7)),
        ]));
        assert_eq!(out.values["n"], FieldValue::Float(5.0));
        assert_eq!(out.values["f"], FieldValue::Float(1.5));
        assert_eq!(out.tags["host"], FieldValue::Integer(7));
    }

    #[test]
    fn test_classify_skips_null_and_nested() {
        let classifier = FieldClassifier::default();
        let out = classifier.classify(record(&[
            ("a", Value::Integer(1)),
            ("n", Value::Null),
            ("arr", Value::Array(vec![Value::Integer(1)])),
        ]));
        assert_eq!(out.values.len(), 1);
        assert!(out.values.contains_key("a"));
    }

    #[test]
    fn test_classify_keys_disjoint() {
        let classifier = FieldClassifier::new(TagPolicy::Auto, false);
        let out = classifier.classify(record(&[
            ("a", Value::Integer(1)),
            ("b", Value::from("x")),
            ("c", Value::Boolean(true)),
            ("d", Value::from("y")),
        ]));
        for key in out.values.keys() {
            assert!(!out.tags.contains_key(key));
        }
        assert_eq!(out.values.len() + out.tags.len(), 4);
    }
}
