//! Per-iteration release of transient device memory.

use burn::tensor::backend::Backend;

/// Called once at the end of every training iteration.
pub trait MemoryReclaimer: Send {
    fn reclaim(&mut self);
}

/// Does nothing. Suitable for host backends.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReclaimer;

impl MemoryReclaimer for NoopReclaimer {
    fn reclaim(&mut self) {}
}

/// Waits for queued work on `device`, then asks the backend to release the
/// cached buffers it no longer needs. No effect on host backends.
#[derive(Debug, Clone)]
pub struct BackendMemoryCleanup<B: Backend> {
    device: B::Device,
}

impl<B: Backend> BackendMemoryCleanup<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> MemoryReclaimer for BackendMemoryCleanup<B> {
    fn reclaim(&mut self) {
        B::sync(&self.device);
        B::memory_cleanup(&self.device);
    }
}
