//! Scalar telemetry sinks.
//!
//! The training loop emits `(tag, value, step)` triples:
//!
//! | Tag | Step | When |
//! |-----|------|------|
//! | `reward/portfolio` | global env step | every realized portfolio value |
//! | `time/explore` | iteration | every iteration |
//! | `time/update` | iteration | actor iterations |
//! | `loss/value` | iteration | actor iterations |
//! | `loss/policy` | iteration | actor iterations |
//! | `reg/action` | iteration | actor iterations |
//! | `reg/policy` | iteration | actor iterations |
//! | `reward/policy` | iteration | actor iterations |
//!
//! Sinks return errors, but the loop only logs them.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::TelemetryError;

pub mod tags {
    pub const PORTFOLIO: &str = "reward/portfolio";
    pub const EXPLORE_TIME: &str = "time/explore";
    pub const UPDATE_TIME: &str = "time/update";
    pub const VALUE_LOSS: &str = "loss/value";
    pub const POLICY_LOSS: &str = "loss/policy";
    pub const ACTION_REG: &str = "reg/action";
    pub const POLICY_REG: &str = "reg/policy";
    pub const POLICY_REWARD: &str = "reward/policy";
}

/// Destination for scalar metrics.
pub trait Telemetry: Send {
    fn scalar(&mut self, tag: &str, value: f32, step: usize) -> Result<(), TelemetryError>;

    fn flush(&mut self) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {
    fn scalar(&mut self, _tag: &str, _value: f32, _step: usize) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Emits each scalar as a `debug` tracing event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn scalar(&mut self, tag: &str, value: f32, step: usize) -> Result<(), TelemetryError> {
        tracing::debug!(target: "portfolio_td3::telemetry", tag, value, step);
        Ok(())
    }
}

/// `tag,step,value` rows in a CSV file.
pub struct CsvTelemetry {
    writer: BufWriter<File>,
}

impl CsvTelemetry {
    /// Create (truncate) the file and write the header.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "tag,step,value")?;
        Ok(Self { writer })
    }
}

impl Telemetry for CsvTelemetry {
    fn scalar(&mut self, tag: &str, value: f32, step: usize) -> Result<(), TelemetryError> {
        writeln!(self.writer, "{tag},{step},{value}")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TelemetryError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for CsvTelemetry {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// One recorded scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarEvent {
    pub tag: String,
    pub value: f32,
    pub step: usize,
}

/// Keeps scalars in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryTelemetry {
    events: Arc<Mutex<Vec<ScalarEvent>>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ScalarEvent> {
        self.events.lock().clone()
    }

    /// Recorded `(step, value)` pairs for one tag, in emission order.
    pub fn series(&self, tag: &str) -> Vec<(usize, f32)> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.tag == tag)
            .map(|e| (e.step, e.value))
            .collect()
    }
}

impl Telemetry for MemoryTelemetry {
    fn scalar(&mut self, tag: &str, value: f32, step: usize) -> Result<(), TelemetryError> {
        self.events.lock().push(ScalarEvent {
            tag: tag.to_string(),
            value,
            step,
        });
        Ok(())
    }
}

/// Fans every scalar out to several sinks.
///
/// All sinks are attempted; the first error is returned.
#[derive(Default)]
pub struct MultiTelemetry {
    sinks: Vec<Box<dyn Telemetry>>,
}

impl MultiTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<T: Telemetry + 'static>(mut self, sink: T) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Telemetry for MultiTelemetry {
    fn scalar(&mut self, tag: &str, value: f32, step: usize) -> Result<(), TelemetryError> {
        let mut first_err = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.scalar(tag, value, step) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn flush(&mut self) -> Result<(), TelemetryError> {
        let mut first_err = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.flush() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
