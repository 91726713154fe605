// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Write capability.
//!
//! The engine never talks to a server directly. It asks a [`WriterFactory`]
//! for one [`PointWriter`] per target and hands it flush groups in order.
//! Two implementations ship with the crate:
//!
//! - [`LineProtocolFactory`]: renders groups as Line Protocol into any
//!   `io::Write` (the CLI's dry-run output)
//! - [`MemoryFactory`]: keeps every group in memory

use crate::influx::{LineProtocolError, LineProtocolWriter};
use crate::precision::TimePrecision;
use crate::router::FlushGroup;
use crate::target::Target;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;

/// Write failures.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    LineProtocol(#[from] LineProtocolError),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Writes flush groups to one target.
pub trait PointWriter: Send {
    /// Write every point of `group`, blocking until done.
    fn write_points(&mut self, group: &FlushGroup) -> Result<(), WriteError>;
}

/// Creates writers for targets.
pub trait WriterFactory: Send {
    /// Open a writer for `target`. Timestamps of the points it receives are
    /// in `precision` unless a group overrides it.
    fn create(
        &mut self,
        target: &Target,
        precision: TimePrecision,
    ) -> Result<Box<dyn PointWriter>, WriteError>;
}

/// Line Protocol writer over a shared output stream.
pub struct LineProtocolSink<W> {
    output: Arc<Mutex<W>>,
    precision: TimePrecision,
    encoder: LineProtocolWriter,
}

impl<W: Write + Send> PointWriter for LineProtocolSink<W> {
    fn write_points(&mut self, group: &FlushGroup) -> Result<(), WriteError> {
        for point in &group.points {
            if let Err(e) = self.encoder.write_point(point) {
                self.encoder.flush();
                return Err(e.into());
            }
        }
        let lines = self.encoder.flush();

        let precision = group.precision.unwrap_or(self.precision);
        let mut out = self.output.lock();
        writeln!(
            out,
            "# target={} rp={} precision={} points={}",
            group.target(),
            group.retention_policy().unwrap_or("-"),
            precision,
            lines.len()
        )?;
        for line in lines {
            writeln!(out, "{}", line)?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Produces [`LineProtocolSink`]s sharing one output.
pub struct LineProtocolFactory<W> {
    output: Arc<Mutex<W>>,
}

impl<W: Write + Send> LineProtocolFactory<W> {
    /// Write every target's groups to `output`.
    pub fn new(output: W) -> Self {
        Self {
            output: Arc::new(Mutex::new(output)),
        }
    }

    /// Shared handle to the output.
    pub fn output(&self) -> Arc<Mutex<W>> {
        Arc::clone(&self.output)
    }
}

impl<W: Write + Send + 'static> WriterFactory for LineProtocolFactory<W> {
    fn create(
        &mut self,
        _target: &Target,
        precision: TimePrecision,
    ) -> Result<Box<dyn PointWriter>, WriteError> {
        Ok(Box::new(LineProtocolSink {
            output: Arc::clone(&self.output),
            precision,
            encoder: LineProtocolWriter::new(),
        }))
    }
}

/// Groups recorded by [`MemoryWriter`]s.
pub type WrittenGroups = Arc<Mutex<Vec<FlushGroup>>>;

/// In-memory writer.
pub struct MemoryWriter {
    written: WrittenGroups,
    reject: bool,
}

impl PointWriter for MemoryWriter {
    fn write_points(&mut self, group: &FlushGroup) -> Result<(), WriteError> {
        if self.reject {
            return Err(WriteError::Transport(format!(
                "database '{}' rejected {} points",
                group.target().database,
                group.len()
            )));
        }
        self.written.lock().push(group.clone());
        Ok(())
    }
}

/// Produces [`MemoryWriter`]s sharing one group log.
#[derive(Default)]
pub struct MemoryFactory {
    written: WrittenGroups,
    created: Arc<Mutex<Vec<Target>>>,
    rejected: HashSet<String>,
    unreachable: HashSet<String>,
}

impl MemoryFactory {
    /// Factory with an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writers for `database` fail every write.
    pub fn reject_database(mut self, database: impl Into<String>) -> Self {
        self.rejected.insert(database.into());
        self
    }

    /// Writers for `database` cannot be created.
    pub fn unreachable_database(mut self, database: impl Into<String>) -> Self {
        self.unreachable.insert(database.into());
        self
    }

    /// Shared log of successfully written groups.
    pub fn written(&self) -> WrittenGroups {
        Arc::clone(&self.written)
    }

    /// Shared log of targets a writer was created for.
    pub fn created(&self) -> Arc<Mutex<Vec<Target>>> {
        Arc::clone(&self.created)
    }
}

impl WriterFactory for MemoryFactory {
    fn create(
        &mut self,
        target: &Target,
        _precision: TimePrecision,
    ) -> Result<Box<dyn PointWriter>, WriteError> {
        if self.unreachable.contains(&target.database) {
            return Err(WriteError::Transport(format!("cannot reach {}", target)));
        }
        self.created.lock().push(target.clone());
        Ok(Box::new(MemoryWriter {
            written: Arc::clone(&self.written),
            reject: self.rejected.contains(&target.database),
        }))
    }
}
