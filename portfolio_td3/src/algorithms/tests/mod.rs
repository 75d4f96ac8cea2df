//! Cross-module tests for the TD3 update.
//!
//! - `td3_update_tests`: delay gating, target tracking and batch handling
//!   through [`Td3Learner`](crate::algorithms::td3::Td3Learner)
//! - `estimator_tests`: training a non-MLP policy through the same traits
