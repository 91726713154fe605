// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Main relay orchestrator.
//!
//! Connects configuration, point building, routing and writing into a
//! single entry point. The engine owns the state that must outlive one
//! batch: the sequence counter and the per-target writers.

use crate::builder::PointBuilder;
use crate::config::{ConfigError, RelayConfig, WriteErrorPolicy};
use crate::event::Event;
use crate::router::{FlushGroup, RetentionRouter};
use crate::sequence::SequenceTagger;
use crate::target::ClientCache;
use crate::writer::{PointWriter, WriteError, WriterFactory};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot open writer for group {index} ({target}): {source}")]
    Connect {
        index: usize,
        target: String,
        source: WriteError,
    },

    #[error("write of group {index} to {target} failed: {source}")]
    Write {
        index: usize,
        target: String,
        source: WriteError,
    },
}

impl EngineError {
    /// Index of the flush group that failed, for write-path errors.
    pub fn group_index(&self) -> Option<usize> {
        match self {
            Self::Config(_) => None,
            Self::Connect { index, .. } | Self::Write { index, .. } => Some(*index),
        }
    }
}

/// Output of [`Engine::transform`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transformed {
    /// Flush groups in write order.
    pub groups: Vec<FlushGroup>,
    /// Records rejected by the builder.
    pub dropped: usize,
}

/// Summary of one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Records received.
    pub records: usize,
    /// Records dropped with a warning.
    pub dropped: usize,
    /// Flush groups written.
    pub groups: usize,
    /// Points written.
    pub points_written: usize,
}

/// Record-to-point relay.
pub struct Engine {
    builder: PointBuilder,
    sequence: SequenceTagger,
    factory: Box<dyn WriterFactory>,
    clients: ClientCache<Box<dyn PointWriter>>,
    on_write_error: WriteErrorPolicy,
}

impl Engine {
    /// Create an engine from configuration.
    pub fn new(config: RelayConfig, factory: Box<dyn WriterFactory>) -> Result<Self, EngineError> {
        let builder = PointBuilder::from_config(&config)?;
        tracing::debug!(
            precision = %builder.precision(),
            dynamic_target = builder.targets().is_dynamic(),
            "engine configured"
        );
        Ok(Self {
            builder,
            sequence: SequenceTagger::new(),
            factory,
            clients: ClientCache::new(),
            on_write_error: config.on_write_error,
        })
    }

    /// Build and route a batch without writing it.
    ///
    /// Rejected records are logged and counted; they never fail the batch.
    pub fn transform(&mut self, events: &[Event]) -> Transformed {
        let mut router = RetentionRouter::new();
        let mut out = Transformed::default();

        for event in events {
            match self.builder.build(event, &mut self.sequence) {
                Ok(routed) => out.groups.extend(router.push(routed)),
                Err(e) => {
                    tracing::warn!(tag = %event.tag, error = %e, "dropping record");
                    out.dropped += 1;
                }
            }
        }
        out.groups.extend(router.finish());
        out
    }

    /// Write flush groups in order, returning the number of points written.
    ///
    /// Under [`WriteErrorPolicy::Abort`] the first failure stops the batch.
    /// Under [`WriteErrorPolicy::Continue`] every group is attempted and the
    /// first failure is returned afterwards.
    pub fn write(&mut self, groups: &[FlushGroup]) -> Result<usize, EngineError> {
        let mut written = 0;
        let mut first_error = None;

        for (index, group) in groups.iter().enumerate() {
            match self.write_group(index, group) {
                Ok(()) => written += group.len(),
                Err(e) => {
                    tracing::warn!(group = index, error = %e, "flush group failed");
                    match self.on_write_error {
                        WriteErrorPolicy::Abort => return Err(e),
                        WriteErrorPolicy::Continue => {
                            first_error.get_or_insert(e);
                        }
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Transform and write one batch.
    pub fn process(&mut self, events: &[Event]) -> Result<FlushReport, EngineError> {
        let transformed = self.transform(events);
        let points_written = self.write(&transformed.groups)?;
        Ok(FlushReport {
            records: events.len(),
            dropped: transformed.dropped,
            groups: transformed.groups.len(),
            points_written,
        })
    }

    /// Number of open writers.
    pub fn connections(&self) -> usize {
        self.clients.len()
    }

    /// Sequence counter state.
    pub fn sequence(&self) -> &SequenceTagger {
        &self.sequence
    }

    fn write_group(&mut self, index: usize, group: &FlushGroup) -> Result<(), EngineError> {
        let target = group.target();
        let precision = self.builder.precision();
        let factory = &mut self.factory;

        let writer = self
            .clients
            .get_or_try_insert_with(target, || factory.create(target, precision))
            .map_err(|source| EngineError::Connect {
                index,
                target: target.descriptor(),
                source,
            })?;

        writer
            .write_points(group)
            .map_err(|source| EngineError::Write {
                index,
                target: target.descriptor(),
                source,
            })?;

        tracing::debug!(
            group = index,
            destination = %group.destination,
            points = group.len(),
            "flushed group"
        );
        Ok(())
    }
}

/// An [`Engine`] shared between threads.
///
/// Each call holds the lock for the whole batch, so sequence numbering and
/// writer creation stay consistent across concurrent callers.
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<Engine>>,
}

impl SharedEngine {
    /// Wrap an engine.
    pub fn new(engine: Engine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Process one batch under the lock.
    pub fn process(&self, events: &[Event]) -> Result<FlushReport, EngineError> {
        self.inner.lock().process(events)
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with<R>(&self, f: impl FnOnce(&mut Engine) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
