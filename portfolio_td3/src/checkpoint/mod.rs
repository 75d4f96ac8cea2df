//! Model checkpointing.
//!
//! The training loop saves the live policy and critic whenever the best
//! portfolio value strictly improves, and writes the final best value once
//! training ends.
//!
//! ```rust,ignore
//! use portfolio_td3::checkpoint::{Checkpointer, CheckpointerConfig};
//!
//! let checkpointer = Checkpointer::new(CheckpointerConfig::new("./models"))?;
//!
//! // Resume:
//! let policy = checkpointer.load_policy(policy_template, &device)?;
//! let value = checkpointer.load_value(value_template, &device)?;
//! ```

pub mod checkpointer;

pub use checkpointer::{BestPortfolioRecord, CheckpointStore, Checkpointer, CheckpointerConfig};
