//! Telemetry, progress reporting and logging setup.
//!
//! ## Telemetry
//!
//! - [`CsvTelemetry`]: `tag,step,value` rows for offline analysis
//! - [`TracingTelemetry`]: debug-level tracing events
//! - [`MemoryTelemetry`]: in-memory buffer, shared between clones
//! - [`MultiTelemetry`]: fan-out to several sinks
//! - [`NullTelemetry`]: discard
//!
//! ## Other
//!
//! - [`ProgressMarker`]: `"<iteration>,<max>"` liveness file
//! - [`init_tracing`]: `EnvFilter`-driven fmt subscriber

pub mod logging;
pub mod progress;
pub mod telemetry;

pub use logging::init_tracing;
pub use progress::ProgressMarker;
pub use telemetry::{
    tags, CsvTelemetry, MemoryTelemetry, MultiTelemetry, NullTelemetry, ScalarEvent, Telemetry,
    TracingTelemetry,
};
