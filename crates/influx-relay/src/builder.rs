// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Record-to-point assembly.
//!
//! For each event the builder, in order:
//! 1. rejects empty records (and, optionally, records with empty strings)
//! 2. resolves the timestamp, preferring the record's own time field
//! 3. resolves the connection target and pulls out the retention policy
//! 4. applies key removal, keep-list and renames
//! 5. classifies fields into values and tags
//! 6. injects the sequence tag
//! 7. names the series
//!
//! A point without values is rejected last, after the sequence counter has
//! seen the record.

use crate::classify::{FieldClassifier, TagPolicy};
use crate::config::{ConfigError, RelayConfig};
use crate::event::Event;
use crate::influx::{FieldValue, Point};
use crate::placeholder::{Metadata, PlaceholderContext, Template};
use crate::precision::{parse_record_time, TimePrecision};
use crate::router::{Destination, RoutedPoint};
use crate::sequence::SequenceTagger;
use crate::target::{TargetError, TargetResolver};
use crate::value::{Record, Value};
use chrono_tz::Tz;
use indexmap::IndexMap;
use thiserror::Error;

/// Reasons a single record is dropped.
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("record is empty")]
    EmptyRecord,

    #[error("field '{0}' holds an empty string")]
    EmptyValue(String),

    #[error("field '{field}' holds an unparseable timestamp '{value}'")]
    Timestamp { field: String, value: String },

    #[error("record has no value fields left")]
    NoValues,

    #[error("series name resolved to an empty string")]
    EmptySeries,

    #[error("target resolution failed: {0}")]
    Target(#[from] TargetError),
}

/// Key removal, keep-list and renames, applied in that order.
#[derive(Debug, Clone, Default)]
pub struct FieldFilter {
    remove: Vec<String>,
    keep: Option<Vec<String>>,
    rename: IndexMap<String, String>,
}

impl FieldFilter {
    /// Create a filter. `keep` rebuilds the record from the listed keys.
    pub fn new(remove: Vec<String>, keep: Option<Vec<String>>, rename: IndexMap<String, String>) -> Self {
        Self {
            remove,
            keep,
            rename,
        }
    }

    /// True when the filter changes nothing.
    pub fn is_identity(&self) -> bool {
        self.remove.is_empty() && self.keep.is_none() && self.rename.is_empty()
    }

    /// Apply the filter.
    pub fn apply(&self, mut record: Record) -> Record {
        for key in &self.remove {
            record.shift_remove(key);
        }

        if let Some(keep) = &self.keep {
            record = keep
                .iter()
                .filter_map(|key| record.shift_remove_entry(key))
                .collect();
        }

        if self.rename.is_empty() {
            return record;
        }
        record
            .into_iter()
            .map(|(key, value)| match self.rename.get(&key) {
                Some(renamed) => (renamed.clone(), value),
                None => (key, value),
            })
            .collect()
    }
}

/// Turns events into routed points.
#[derive(Debug, Clone)]
pub struct PointBuilder {
    time_key: String,
    precision: TimePrecision,
    time_zone: Option<Tz>,
    reject_empty_values: bool,
    retention_policy_key: Option<String>,
    default_retention_policy: Option<String>,
    filter: FieldFilter,
    classifier: FieldClassifier,
    sequence_tag: Option<String>,
    measurement: Option<Template>,
    targets: TargetResolver,
    metadata: Metadata,
    placeholder_depth: usize,
}

impl PointBuilder {
    /// Validate `config` and build from it.
    pub fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let keep = if config.renew_record {
            Some(config.keep_keys.clone())
        } else {
            None
        };

        Ok(Self {
            time_key: config.time_key.clone(),
            precision: config.precision()?,
            time_zone: config.time_zone()?,
            reject_empty_values: config.reject_empty_values,
            retention_policy_key: config.retention_policy_key.clone(),
            default_retention_policy: config.default_retention_policy.clone(),
            filter: FieldFilter::new(config.remove_keys.clone(), keep, config.rename_keys.clone()),
            classifier: FieldClassifier::new(
                TagPolicy::new(&config.tag_keys, config.auto_tags),
                config.cast_number_to_float,
            ),
            sequence_tag: config.sequence_tag.clone(),
            measurement: config.measurement.as_deref().map(Template::parse),
            targets: TargetResolver::from_config(config)?,
            metadata: config.placeholder_metadata(),
            placeholder_depth: config.placeholder_depth,
        })
    }

    /// Timestamp unit of built points.
    pub fn precision(&self) -> TimePrecision {
        self.precision
    }

    /// Connection target resolution.
    pub fn targets(&self) -> &TargetResolver {
        &self.targets
    }

    /// True when records need a placeholder context.
    pub fn needs_context(&self) -> bool {
        self.targets.is_dynamic()
            || self
                .measurement
                .as_ref()
                .is_some_and(|template| !template.is_static())
    }

    /// Build the point for one event.
    pub fn build(&self, event: &Event, sequence: &mut SequenceTagger) -> Result<RoutedPoint, RecordError> {
        if event.record.is_empty() {
            return Err(RecordError::EmptyRecord);
        }
        if self.reject_empty_values {
            let empty = event
                .record
                .iter()
                .find(|(_, value)| matches!(value, Value::String(s) if s.is_empty()));
            if let Some((key, _)) = empty {
                return Err(RecordError::EmptyValue(key.clone()));
            }
        }

        let time = match event.record.get(&self.time_key) {
            None | Some(Value::Null) => event.time,
            Some(value) => {
                parse_record_time(value, self.time_zone).ok_or_else(|| RecordError::Timestamp {
                    field: self.time_key.clone(),
                    value: value.to_string(),
                })?
            }
        };
        let timestamp = self.precision.convert(time);

        let ctx = if self.needs_context() {
            PlaceholderContext::for_record(
                &event.tag,
                time,
                &event.record,
                &self.metadata,
                self.placeholder_depth,
            )
        } else {
            PlaceholderContext::new()
        };
        let target = self.targets.resolve(&ctx)?;

        let mut record = event.record.clone();
        record.shift_remove(&self.time_key);

        let retention_policy = match &self.retention_policy_key {
            Some(key) => match record.shift_remove(key) {
                Some(Value::String(rp)) if !rp.trim().is_empty() => Some(rp),
                Some(rp @ (Value::Integer(_) | Value::Float(_) | Value::Boolean(_))) => {
                    Some(rp.to_string())
                }
                Some(Value::String(_)) | Some(Value::Null) | None => {
                    self.default_retention_policy.clone()
                }
                Some(other) => {
                    tracing::debug!(
                        field = %key,
                        kind = other.type_name(),
                        "ignoring non-scalar retention policy"
                    );
                    self.default_retention_policy.clone()
                }
            },
            None => self.default_retention_policy.clone(),
        };

        let record = self.filter.apply(record);
        let mut classified = self.classifier.classify(record);

        if let Some(name) = &self.sequence_tag {
            let n = sequence.next(timestamp);
            classified.values.shift_remove(name);
            classified
                .tags
                .insert(name.clone(), FieldValue::Integer(n as i64));
        }

        let series = match &self.measurement {
            Some(template) if template.is_static() => template.source().to_string(),
            Some(template) => template.render(&ctx),
            None => event.tag.clone(),
        };
        if series.is_empty() {
            return Err(RecordError::EmptySeries);
        }

        if classified.values.is_empty() {
            return Err(RecordError::NoValues);
        }

        Ok(RoutedPoint {
            point: Point {
                series,
                timestamp,
                values: classified.values,
                tags: classified.tags,
            },
            destination: Destination::new(target, retention_policy),
        })
    }
}
