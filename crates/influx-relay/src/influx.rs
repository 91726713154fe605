// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Points and their InfluxDB Line Protocol encoding.
//!
//! Line Protocol format:
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp
//! ```
//!
//! The timestamp is written as-is; its unit is the precision the point was
//! built with.
//!
//! See: <https://docs.influxdata.com/influxdb/v1/write_protocols/line_protocol_reference/>

use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;
use thiserror::Error;

/// A scalar that can be stored as an InfluxDB field or tag.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit floating point.
    Float(f64),
    /// 64-bit signed integer.
    Integer(i64),
    /// UTF-8 string.
    String(String),
    /// Boolean value.
    Boolean(bool),
}

impl FieldValue {
    /// Convert a record value. Null, arrays and maps have no field form.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(Self::Float(v)),
            Value::Integer(v) => Some(Self::Integer(v)),
            Value::String(v) => Some(Self::String(v)),
            Value::Boolean(v) => Some(Self::Boolean(v)),
            Value::Null | Value::Array(_) | Value::Map(_) => None,
        }
    }

    /// Format this value as a Line Protocol field value.
    ///
    /// - Float: written as-is (e.g., `3.14`), integral floats keep a `.0`
    /// - Integer: suffixed with `i` (e.g., `42i`)
    /// - String: quoted with double quotes, inner quotes escaped (e.g., `"hello"`)
    /// - Boolean: `true` or `false`
    pub fn to_line_protocol(&self) -> String {
        match self {
            FieldValue::Float(v) if v.is_finite() && v.fract() == 0.0 => format!("{:.1}", v),
            FieldValue::Float(v) => format!("{}", v),
            FieldValue::Integer(v) => format!("{}i", v),
            FieldValue::String(v) => {
                let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\"", escaped)
            }
            FieldValue::Boolean(v) => v.to_string(),
        }
    }

    /// Format this value as a (string) tag value, without type markers.
    pub fn to_tag_string(&self) -> String {
        match self {
            FieldValue::Float(v) => v.to_string(),
            FieldValue::Integer(v) => v.to_string(),
            FieldValue::String(v) => v.clone(),
            FieldValue::Boolean(v) => v.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line_protocol())
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

/// One time-series datum.
///
/// `values` is never empty for a point produced by the builder, and its
/// keys never overlap the keys of `tags`.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Destination series (measurement) name.
    pub series: String,
    /// Timestamp in the configured precision unit.
    pub timestamp: i64,
    /// Value fields.
    pub values: IndexMap<String, FieldValue>,
    /// Tag fields.
    pub tags: IndexMap<String, FieldValue>,
}

impl Point {
    /// Create a point with no fields.
    pub fn new(series: impl Into<String>, timestamp: i64) -> Self {
        Self {
            series: series.into(),
            timestamp,
            values: IndexMap::new(),
            tags: IndexMap::new(),
        }
    }

    /// Add a value field.
    pub fn value(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Add a tag.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Line Protocol encoding errors.
#[derive(Debug, Error)]
pub enum LineProtocolError {
    #[error("point in series '{0}' has no fields")]
    NoFields(String),

    #[error("point has an empty series name")]
    EmptySeries,
}

/// Encode a single point as one Line Protocol line.
///
/// Tags are sorted by key (canonical form); fields keep their order.
pub fn encode_point(point: &Point) -> Result<String, LineProtocolError> {
    if point.series.is_empty() {
        return Err(LineProtocolError::EmptySeries);
    }
    if point.values.is_empty() {
        return Err(LineProtocolError::NoFields(point.series.clone()));
    }

    let mut line = escape_measurement(&point.series);

    let mut sorted_tags: Vec<_> = point.tags.iter().collect();
    sorted_tags.sort_by_key(|(k, _)| k.as_str());
    for (key, value) in sorted_tags {
        let value = value.to_tag_string();
        if value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(&value));
    }

    line.push(' ');
    for (i, (key, value)) in point.values.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&value.to_line_protocol());
    }

    line.push(' ');
    line.push_str(&point.timestamp.to_string());
    Ok(line)
}

/// Line Protocol writer.
///
/// Accumulates encoded points in an internal buffer and hands them out
/// when flushed.
#[derive(Debug, Default)]
pub struct LineProtocolWriter {
    buffer: Vec<String>,
}

impl LineProtocolWriter {
    /// Create a new empty writer.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Encode and buffer a point.
    pub fn write_point(&mut self, point: &Point) -> Result<(), LineProtocolError> {
        let line = encode_point(point)?;
        self.buffer.push(line);
        Ok(())
    }

    /// Flush the buffer, returning all accumulated lines.
    pub fn flush(&mut self) -> Vec<String> {
        std::mem::take(&mut self.buffer)
    }

    /// Get the current number of buffered lines.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Escape measurement name: commas and spaces.
fn escape_measurement(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace(' ', "\\ ")
}

/// Escape tag keys, tag values and field keys: commas, equals signs, spaces.
fn escape_key(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_float() {
        assert_eq!(FieldValue::Float(3.15).to_line_protocol(), "3.15");
        assert_eq!(FieldValue::Float(2.0).to_line_protocol(), "2.0");
    }

    #[test]
    fn test_field_value_integer() {
        assert_eq!(FieldValue::Integer(42).to_line_protocol(), "42i");
    }

    #[test]
    fn test_field_value_string_with_quotes() {
        let v = FieldValue::String("say \"hi\"".to_string());
        assert_eq!(v.to_line_protocol(), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_field_value_boolean() {
        assert_eq!(FieldValue::Boolean(true).to_line_protocol(), "true");
        assert_eq!(FieldValue::Boolean(false).to_line_protocol(), "false");
    }

    #[test]
    fn test_field_value_from_value() {
        assert_eq!(
            FieldValue::from_value(Value::Integer(1)),
            Some(FieldValue::Integer(1))
        );
        assert_eq!(FieldValue::from_value(Value::Null), None);
        assert_eq!(FieldValue::from_value(Value::Array(vec![])), None);
    }

    #[test]
    fn test_encode_simple_point() {
        let point = Point::new("temperature", 1_000_000_000).value("value", 23.5);
        assert_eq!(
            encode_point(&point).unwrap(),
            "temperature value=23.5 1000000000"
        );
    }

    #[test]
    fn test_encode_sorted_tags_and_typed_tag_values() {
        let point = Point::new("weather", 2)
            .tag("station", "north")
            .tag("_seq", 3i64)
            .value("temp", 22.1)
            .value("humidity", 65i64)
            .value("ok", true);
        assert_eq!(
            encode_point(&point).unwrap(),
            "weather,_seq=3,station=north temp=22.1,humidity=65i,ok=true 2"
        );
    }

    #[test]
    fn test_encode_escape_special_chars() {
        let point = Point::new("my measurement", 3)
            .tag("tag key", "tag,value")
            .value("field=key", "hello \"world\"");
        assert_eq!(
            encode_point(&point).unwrap(),
            "my\\ measurement,tag\\ key=tag\\,value field\\=key=\"hello \\\"world\\\"\" 3"
        );
    }

    #[test]
    fn test_encode_rejects_empty_fields() {
        let point = Point::new("m", 1).tag("a", "b");
        match encode_point(&point) {
            Err(LineProtocolError::NoFields(series)) => assert_eq!(series, "m"),
            other => panic!("expected NoFields, got {:?}", other),
        }
        assert!(matches!(
            encode_point(&Point::new("", 1).value("a", 1i64)),
            Err(LineProtocolError::EmptySeries)
        ));
    }

    #[test]
    fn test_writer_len_and_empty() {
        let mut writer = LineProtocolWriter::new();
        assert!(writer.is_empty());

        writer
            .write_point(&Point::new("m", 1).value("f", 1i64))
            .expect("write");
        assert!(!writer.is_empty());
        assert_eq!(writer.len(), 1);

        let lines = writer.flush();
        assert_eq!(lines, vec!["m f=1i 1".to_string()]);
        assert!(writer.is_empty());
    }
}
