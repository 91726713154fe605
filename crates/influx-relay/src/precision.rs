// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Timestamp handling and precision conversion.
//!
//! Event times arrive as `(seconds, nanoseconds)` pairs. A record may also
//! carry its own timestamp field, which takes precedence. Points store the
//! timestamp as an integer count of the configured [`TimePrecision`] unit.
//! Conversion truncates (floors), it never rounds.
//!
//! Date-times without an offset are read in the configured zone, or UTC.

use crate::config::ConfigError;
use crate::value::Value;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Unit used for point timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimePrecision {
    Hour,
    Minute,
    #[default]
    Second,
    Millisecond,
    Microsecond,
    Nanosecond,
}

impl TimePrecision {
    /// Short unit name as understood by InfluxDB (`h`, `m`, `s`, `ms`, `u`, `ns`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "h",
            Self::Minute => "m",
            Self::Second => "s",
            Self::Millisecond => "ms",
            Self::Microsecond => "u",
            Self::Nanosecond => "ns",
        }
    }

    /// Length of one unit in nanoseconds.
    pub fn unit_nanos(&self) -> i128 {
        match self {
            Self::Hour => 3_600 * NANOS_PER_SEC,
            Self::Minute => 60 * NANOS_PER_SEC,
            Self::Second => NANOS_PER_SEC,
            Self::Millisecond => 1_000_000,
            Self::Microsecond => 1_000,
            Self::Nanosecond => 1,
        }
    }

    /// Express `time` as a whole number of units since the epoch.
    ///
    /// Floors toward negative infinity, so `1_999_999_999ns` is `1s` and
    /// pre-epoch instants never round up.
    pub fn convert(&self, time: EventTime) -> i64 {
        let units = time.as_nanos().div_euclid(self.unit_nanos());
        units.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

impl FromStr for TimePrecision {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h" | "hour" => Ok(Self::Hour),
            "m" | "minute" => Ok(Self::Minute),
            "s" | "second" => Ok(Self::Second),
            "ms" | "millisecond" => Ok(Self::Millisecond),
            "u" | "us" | "microsecond" => Ok(Self::Microsecond),
            "ns" | "nanosecond" => Ok(Self::Nanosecond),
            _ => Err(ConfigError::UnknownPrecision(s.to_string())),
        }
    }
}

impl fmt::Display for TimePrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An instant delivered alongside a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EventTime {
    /// Whole seconds since the Unix epoch.
    pub secs: i64,
    /// Sub-second part, always `< 1_000_000_000`.
    pub nanos: u32,
}

impl EventTime {
    /// Create from a seconds/nanoseconds pair, carrying nanosecond overflow.
    pub fn new(secs: i64, nanos: u32) -> Self {
        let carry = (nanos / 1_000_000_000) as i64;
        Self {
            secs: secs.saturating_add(carry),
            nanos: nanos % 1_000_000_000,
        }
    }

    /// Whole-second instant.
    pub fn from_secs(secs: i64) -> Self {
        Self { secs, nanos: 0 }
    }

    /// Instant from a total nanosecond count.
    pub fn from_nanos(nanos: i128) -> Self {
        Self {
            secs: nanos.div_euclid(NANOS_PER_SEC) as i64,
            nanos: nanos.rem_euclid(NANOS_PER_SEC) as u32,
        }
    }

    /// Instant from fractional epoch seconds. Returns `None` for NaN/inf.
    pub fn from_secs_f64(secs: f64) -> Option<Self> {
        if !secs.is_finite() || secs.abs() > i64::MAX as f64 {
            return None;
        }
        let whole = secs.floor();
        let nanos = ((secs - whole) * 1e9) as u32;
        Some(Self::new(whole as i64, nanos.min(999_999_999)))
    }

    /// Total nanoseconds since the epoch.
    pub fn as_nanos(&self) -> i128 {
        self.secs as i128 * NANOS_PER_SEC + self.nanos as i128
    }

    /// Wall-clock now.
    pub fn now() -> Self {
        let now = Utc::now();
        Self::new(now.timestamp(), now.timestamp_subsec_nanos())
    }

    fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Self::new(dt.timestamp(), dt.timestamp_subsec_nanos())
    }
}

/// Serialized as `[secs, nanos]`; deserialized from an integer, a float or a pair.
impl Serialize for EventTime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.secs, self.nanos).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EventTime {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Secs(i64),
            Fractional(f64),
            Pair(i64, u32),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Secs(secs) => Ok(Self::from_secs(secs)),
            Repr::Fractional(secs) => Self::from_secs_f64(secs)
                .ok_or_else(|| serde::de::Error::custom("event time is not finite")),
            Repr::Pair(secs, nanos) => Ok(Self::new(secs, nanos)),
        }
    }
}

/// Layouts without an offset, tried last.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
];

/// Offset-carrying layouts tried after RFC 3339.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f %z", "%d/%b/%Y:%H:%M:%S %z"];

/// Interpret a record-embedded timestamp.
///
/// Integers are epoch seconds, floats fractional epoch seconds. Strings may
/// be numeric epoch seconds or date-times (RFC 3339, a few common layouts
/// with an offset, or offset-less layouts read in `zone`, UTC when `None`).
/// Anything else is `None`.
pub fn parse_record_time(value: &Value, zone: Option<Tz>) -> Option<EventTime> {
    match value {
        Value::Integer(secs) => Some(EventTime::from_secs(*secs)),
        Value::Float(secs) => EventTime::from_secs_f64(*secs),
        Value::String(s) => parse_time_str(s.trim(), zone),
        _ => None,
    }
}

fn parse_time_str(s: &str, zone: Option<Tz>) -> Option<EventTime> {
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<i64>() {
        return Some(EventTime::from_secs(secs));
    }
    if let Ok(secs) = s.parse::<f64>() {
        return EventTime::from_secs_f64(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(EventTime::from_datetime(&dt));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(EventTime::from_datetime(&dt));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return match zone {
                // A wall time skipped by a DST jump has no instant.
                Some(tz) => tz
                    .from_local_datetime(&naive)
                    .earliest()
                    .map(|dt| EventTime::from_datetime(&dt)),
                None => Some(EventTime::from_datetime(&Utc.from_utc_datetime(&naive))),
            };
        }
    }
    None
}
