//! TD3 (Twin Delayed Deep Deterministic Policy Gradient).
//!
//! TD3 trains a deterministic policy against twin critics:
//! - **Clipped double Q**: the Bellman target uses `min(Q1', Q2')`
//! - **Target policy smoothing**: clipped noise on the target action
//! - **Delayed updates**: actor and targets move every `policy_freq` steps
//!
//! ```text
//! Policy π        Twin critic (Q1, Q2)
//!   │                  │
//!   ├─ π_target        ├─ (Q1, Q2)_target     <- soft_update(τ)
//! ```

pub mod estimators;
mod learner;
mod losses;

pub use estimators::{latest_timestep, PolicyEstimator, PolicyOutput, TwinQ, ValueEstimator};
pub use learner::{adam_optimizers, ActorLosses, Td3Learner, UpdateOutput};
pub use losses::{
    actor_objective, bellman_target, smoothed_target_action, twin_critic_loss, ActorObjective,
};
