//! Reference estimator networks.
//!
//! - [`mlp`]: feed-forward actor and twin critic over the latest timestep

pub mod mlp;

pub use mlp::{Mlp, MlpConfig, MlpPolicy, MlpPolicyConfig, TwinMlpCritic, TwinMlpCriticConfig};
