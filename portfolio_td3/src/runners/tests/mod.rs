//! Tests for the training loop.
//!
//! - `training_loop_tests`: scripted exploration against the real learner,
//!   counting and file-backed checkpoint stores, in-memory telemetry

pub mod training_loop_tests;
