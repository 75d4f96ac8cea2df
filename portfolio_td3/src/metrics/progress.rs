//! Progress marker file.
//!
//! An external monitor polls a small file holding `"<iteration>,<max>"`.
//! The file is truncated and rewritten every iteration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ProgressMarker {
    path: PathBuf,
}

impl ProgressMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the marker with `"<iteration>,<max_iteration>"`.
    pub fn write(&self, iteration: usize, max_iteration: usize) -> io::Result<()> {
        fs::write(&self.path, format!("{iteration},{max_iteration}"))
    }

    /// Like [`write`](Self::write), but failures are only logged.
    pub fn update(&self, iteration: usize, max_iteration: usize) {
        if let Err(e) = self.write(iteration, max_iteration) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to write progress marker"
            );
        }
    }
}
