// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Input events.
//!
//! The buffering layer hands the engine an ordered slice of events per
//! invocation. On the command line each event is one JSON line:
//!
//! ```text
//! ["app.web", 1293974055, {"status": 200, "path": "/"}]
//! ["app.web", [1293974055, 500], {"status": 404}]
//! ```

use crate::precision::EventTime;
use crate::value::{Record, Value};
use thiserror::Error;

/// Event decoding errors.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid event line: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event record must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// One `(tag, time, record)` triple.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Routing tag, dot-separated.
    pub tag: String,
    /// Delivery time, used when the record carries no timestamp field.
    pub time: EventTime,
    /// Record fields.
    pub record: Record,
}

impl Event {
    /// Create an event.
    pub fn new(tag: impl Into<String>, time: EventTime, record: Record) -> Self {
        Self {
            tag: tag.into(),
            time,
            record,
        }
    }

    /// Decode a `[tag, time, record]` JSON line.
    pub fn from_json_line(line: &str) -> Result<Self, EventError> {
        let (tag, time, record): (String, EventTime, Value) = serde_json::from_str(line)?;
        match record {
            Value::Map(record) => Ok(Self::new(tag, time, record)),
            other => Err(EventError::NotAnObject(other.type_name())),
        }
    }
}
