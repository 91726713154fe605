// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Same-timestamp disambiguation.
//!
//! InfluxDB overwrites points that share series, tag set and timestamp. A
//! sequence tag keeps such points distinct: consecutive records with the same
//! resolved timestamp get `0, 1, 2, ...`, and the counter restarts at `0`
//! whenever the timestamp changes. Records must be fed in arrival order.

/// Sequence counter state, kept for the lifetime of the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceTagger {
    last_timestamp: Option<i64>,
    counter: u64,
}

impl SequenceTagger {
    /// Fresh state: no previous timestamp.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number for a record at `timestamp`.
    pub fn next(&mut self, timestamp: i64) -> u64 {
        if self.last_timestamp == Some(timestamp) {
            self.counter += 1;
        } else {
            self.counter = 0;
            self.last_timestamp = Some(timestamp);
        }
        self.counter
    }

    /// Timestamp of the last record seen.
    pub fn last_timestamp(&self) -> Option<i64> {
        self.last_timestamp
    }

    /// Forget the previous timestamp.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
