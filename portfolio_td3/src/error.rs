//! Error types for the TD3 agent.
//!
//! Errors are split by concern. Only [`Td3Error`] crosses the training loop
//! boundary; telemetry, progress and checkpoint failures are logged and the
//! loop keeps going.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Malformed transition batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchError {
    #[error("batch is empty")]
    Empty,
    #[error("`{field}` has {actual} entries, expected {expected}")]
    Misaligned {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("observation dimension mismatch: expected {expected}, got {actual}")]
    ObservationShape { expected: usize, actual: usize },
}

/// Failures raised while collecting a round of experience.
#[derive(Error, Debug)]
pub enum ExplorationError {
    #[error("environment {env_id} failed: {source}")]
    Environment {
        env_id: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("policy snapshot unavailable: {0}")]
    Snapshot(String),
    #[error("policy inference failed: {0}")]
    Inference(String),
    #[error("exploration worker {0} panicked")]
    WorkerPanicked(usize),
    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// Checkpoint persistence errors.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("recorder error: {0}")]
    Recorder(String),
    #[error("best portfolio record error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no checkpoint found at {0}")]
    NotFound(PathBuf),
}

/// Telemetry sink errors. Never fatal for training.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Fatal errors surfaced by the training loop.
#[derive(Error, Debug)]
pub enum Td3Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Exploration(#[from] ExplorationError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}
