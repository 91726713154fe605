// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB Relay
//!
//! Turns batches of tagged, timestamped records into InfluxDB points and
//! groups them into ordered write batches per destination.
//!
//! This crate provides:
//! - TOML configuration with placeholder templates for connection fields
//!   and the series name
//! - Timestamp resolution and precision conversion
//! - Tag/value classification (explicit keys, automatic, or none)
//! - Same-timestamp disambiguation through a sequence tag
//! - Contiguous-run routing by target and retention policy
//! - InfluxDB Line Protocol generation
//!
//! # Overview
//!
//! The relay does NOT speak HTTP. Writes go through the [`PointWriter`]
//! trait, obtained per target from a [`WriterFactory`].
//!
//! ```text
//! Event --> PointBuilder --> RetentionRouter --> FlushGroup --> PointWriter
//! ```
//!
//! # Example
//!
//! ```
//! use influx_relay::{Engine, Event, EventTime, MemoryFactory, RelayConfig, Value};
//!
//! let factory = MemoryFactory::new();
//! let written = factory.written();
//! let config = RelayConfig::new("metrics").with_tag_keys(["host"]);
//! let mut engine = Engine::new(config, Box::new(factory)).unwrap();
//!
//! let mut record = influx_relay::Record::new();
//! record.insert("host".into(), Value::from("web-1"));
//! record.insert("load".into(), Value::Float(0.7));
//!
//! let report = engine
//!     .process(&[Event::new("cpu", EventTime::from_secs(1), record)])
//!     .unwrap();
//! assert_eq!(report.points_written, 1);
//! assert_eq!(written.lock()[0].points[0].series, "cpu");
//! ```

pub mod builder;
pub mod classify;
pub mod config;
pub mod engine;
pub mod event;
pub mod influx;
pub mod placeholder;
pub mod precision;
pub mod router;
pub mod sequence;
pub mod target;
pub mod value;
pub mod writer;

pub use builder::{PointBuilder, RecordError};
pub use config::{ConfigError, PortSetting, RelayConfig, WriteErrorPolicy};
pub use engine::{Engine, EngineError, FlushReport, SharedEngine, Transformed};
pub use event::{Event, EventError};
pub use influx::{FieldValue, LineProtocolWriter, Point};
pub use precision::{EventTime, TimePrecision};
pub use router::{Destination, FlushGroup, RoutedPoint};
pub use target::Target;
pub use value::{Record, Value};
pub use writer::{LineProtocolFactory, MemoryFactory, PointWriter, WriteError, WriterFactory};
