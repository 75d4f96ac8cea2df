//! Learning algorithms.
//!
//! - `td3`: twin delayed DDPG update rule, estimator traits and loss terms

pub mod td3;

pub use td3::{
    adam_optimizers, ActorLosses, PolicyEstimator, PolicyOutput, Td3Learner, TwinQ,
    UpdateOutput, ValueEstimator,
};

#[cfg(test)]
mod tests;
