//! Experience collection and the training loop.
//!
//! - [`exploration`]: single- and multi-environment rollout strategies
//! - [`trainer`]: iteration driver (explore, report, update, checkpoint)
//! - [`memory`]: per-iteration device memory release

pub mod exploration;
pub mod memory;
pub mod trainer;

pub use exploration::{
    Exploration, ExplorationRound, ExplorationStrategy, MultiEnvExploration, NoiseSettings,
    SingleEnvExploration,
};
pub use memory::{BackendMemoryCleanup, MemoryReclaimer, NoopReclaimer};
pub use trainer::{BestPortfolio, Td3Trainer, TrainingSummary};

#[cfg(test)]
mod tests;
