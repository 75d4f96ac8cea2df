//! Core data types shared by the learner and the exploration workers.

pub mod batch;
pub mod grad_norm;
pub mod policy_slot;
pub mod target_network;

pub use batch::{BatchTensors, TransitionBatch};
pub use grad_norm::{clip_grad_norm, global_grad_norm};
pub use policy_slot::{policy_slot, PolicySlot, SharedPolicySlot};
pub use target_network::{flat_parameters, soft_update};
