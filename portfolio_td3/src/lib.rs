//! # portfolio_td3: TD3 for continuous portfolio control
//!
//! Twin delayed DDPG (TD3) update rule and training loop for an agent that
//! allocates across assets from a windowed market observation.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Td3Trainer                               │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Exploration (1..N envs)        Td3Learner                        │
//! │  ┌────────────┐                 ┌──────────────────────────────┐  │
//! │  │ env 0      │  TransitionBatch│ critic step (twin MSE)       │  │
//! │  │ env 1  ... │ ──────────────▶ │ actor step every policy_freq │  │
//! │  │ env N      │                 │ soft update of both targets  │  │
//! │  └─────▲──────┘                 └──────────────┬───────────────┘  │
//! │        │        PolicySlot (snapshot)          │                  │
//! │        └───────────────────────────────────────┘                  │
//! │                                                                   │
//! │  Telemetry · ProgressMarker · Checkpointer (on new best)          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use portfolio_td3::prelude::*;
//!
//! let config = AgentConfig::load("agent.toml")?;
//! let (po, vo) = adam_optimizers::<B, MlpPolicy<B>, TwinMlpCritic<B>>();
//! let learner = Td3Learner::new(policy, value, po, vo, config.td3.clone(), device)?;
//!
//! let mut trainer = Td3Trainer::new(learner, exploration, checkpointer, telemetry, config.trainer);
//! let mut best = BestPortfolio::default();
//! let summary = trainer.learn(&mut best)?;
//! ```

pub mod algorithms;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod environment;
pub mod error;
pub mod metrics;
pub mod nn;
pub mod runners;

pub use algorithms::td3::{
    adam_optimizers, latest_timestep, ActorLosses, PolicyEstimator, PolicyOutput, Td3Learner,
    TwinQ, UpdateOutput, ValueEstimator,
};
pub use checkpoint::{BestPortfolioRecord, CheckpointStore, Checkpointer, CheckpointerConfig};
pub use config::{AgentConfig, Td3Config, TrainerConfig};
pub use core::{flat_parameters, soft_update, BatchTensors, PolicySlot, TransitionBatch};
pub use environment::{EnvStep, PortfolioEnv, SyntheticMarketConfig, SyntheticMarketEnv};
pub use error::{
    BatchError, CheckpointError, ConfigError, ExplorationError, Td3Error, TelemetryError,
};
pub use metrics::{
    init_tracing, CsvTelemetry, MemoryTelemetry, MultiTelemetry, NullTelemetry, ProgressMarker,
    Telemetry, TracingTelemetry,
};
pub use nn::{MlpPolicy, MlpPolicyConfig, TwinMlpCritic, TwinMlpCriticConfig};
pub use runners::{
    BackendMemoryCleanup, BestPortfolio, Exploration, ExplorationRound, ExplorationStrategy,
    MemoryReclaimer, MultiEnvExploration, NoiseSettings, NoopReclaimer, SingleEnvExploration,
    Td3Trainer, TrainingSummary,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::algorithms::td3::{
        adam_optimizers, PolicyEstimator, Td3Learner, UpdateOutput, ValueEstimator,
    };
    pub use crate::checkpoint::{CheckpointStore, Checkpointer, CheckpointerConfig};
    pub use crate::config::{AgentConfig, Td3Config, TrainerConfig};
    pub use crate::core::TransitionBatch;
    pub use crate::environment::{PortfolioEnv, SyntheticMarketConfig};
    pub use crate::error::Td3Error;
    pub use crate::metrics::{init_tracing, MultiTelemetry, Telemetry};
    pub use crate::nn::{MlpPolicy, MlpPolicyConfig, TwinMlpCritic, TwinMlpCriticConfig};
    pub use crate::runners::{BestPortfolio, Exploration, ExplorationStrategy, Td3Trainer};
}
