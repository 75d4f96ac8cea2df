//! Transition batches and their tensor form.
//!
//! A [`TransitionBatch`] is what one exploration round produces: `N`
//! aligned `(obs, action, reward, next_obs, done)` samples stored flat on
//! the host. Observations are `[N, T, F]` row-major (sample, window step,
//! feature), oldest step first.
//!
//! [`BatchTensors`] is the device view the TD3 update consumes.

use burn::prelude::*;

use crate::error::BatchError;

/// Host-side transitions from one exploration round.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionBatch {
    window: usize,
    features: usize,
    action_dim: usize,
    observations: Vec<f32>,
    actions: Vec<f32>,
    rewards: Vec<f32>,
    next_observations: Vec<f32>,
    dones: Vec<bool>,
}

impl TransitionBatch {
    /// Empty batch for observations of `window x features` and actions of
    /// `action_dim` values.
    pub fn new(window: usize, features: usize, action_dim: usize) -> Self {
        Self {
            window,
            features,
            action_dim,
            observations: Vec::new(),
            actions: Vec::new(),
            rewards: Vec::new(),
            next_observations: Vec::new(),
            dones: Vec::new(),
        }
    }

    /// Build a batch from flat columns, checking that all of them hold
    /// the same number of samples.
    #[allow(clippy::too_many_arguments)]
    pub fn from_columns(
        window: usize,
        features: usize,
        action_dim: usize,
        observations: Vec<f32>,
        actions: Vec<f32>,
        rewards: Vec<f32>,
        next_observations: Vec<f32>,
        dones: Vec<bool>,
    ) -> Result<Self, BatchError> {
        let batch = Self {
            window,
            features,
            action_dim,
            observations,
            actions,
            rewards,
            next_observations,
            dones,
        };
        batch.validate()?;
        Ok(batch)
    }

    /// Append one transition.
    pub fn push(
        &mut self,
        obs: &[f32],
        action: &[f32],
        reward: f32,
        next_obs: &[f32],
        done: bool,
    ) -> Result<(), BatchError> {
        let obs_dim = self.obs_dim();
        if obs.len() != obs_dim {
            return Err(BatchError::ObservationShape {
                expected: obs_dim,
                actual: obs.len(),
            });
        }
        if next_obs.len() != obs_dim {
            return Err(BatchError::ObservationShape {
                expected: obs_dim,
                actual: next_obs.len(),
            });
        }
        if action.len() != self.action_dim {
            return Err(BatchError::Misaligned {
                field: "actions",
                expected: self.action_dim,
                actual: action.len(),
            });
        }

        self.observations.extend_from_slice(obs);
        self.actions.extend_from_slice(action);
        self.rewards.push(reward);
        self.next_observations.extend_from_slice(next_obs);
        self.dones.push(done);
        Ok(())
    }

    /// Append every transition of `other`, keeping order.
    pub fn append(&mut self, other: TransitionBatch) -> Result<(), BatchError> {
        if other.obs_dim() != self.obs_dim() {
            return Err(BatchError::ObservationShape {
                expected: self.obs_dim(),
                actual: other.obs_dim(),
            });
        }
        if other.action_dim != self.action_dim {
            return Err(BatchError::Misaligned {
                field: "actions",
                expected: self.action_dim,
                actual: other.action_dim,
            });
        }
        self.observations.extend(other.observations);
        self.actions.extend(other.actions);
        self.rewards.extend(other.rewards);
        self.next_observations.extend(other.next_observations);
        self.dones.extend(other.dones);
        Ok(())
    }

    /// Check that every column describes the same `N` samples.
    pub fn validate(&self) -> Result<(), BatchError> {
        let n = self.rewards.len();
        let obs_dim = self.obs_dim();
        let checks = [
            ("observations", n * obs_dim, self.observations.len()),
            ("next_observations", n * obs_dim, self.next_observations.len()),
            ("actions", n * self.action_dim, self.actions.len()),
            ("dones", n, self.dones.len()),
        ];
        for (field, expected, actual) in checks {
            if expected != actual {
                return Err(BatchError::Misaligned {
                    field,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn features(&self) -> usize {
        self.features
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    pub fn obs_dim(&self) -> usize {
        self.window * self.features
    }

    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    pub fn dones(&self) -> &[bool] {
        &self.dones
    }

    pub fn actions(&self) -> &[f32] {
        &self.actions
    }

    /// Mean reward over the batch, `0.0` when empty.
    pub fn mean_reward(&self) -> f32 {
        if self.rewards.is_empty() {
            return 0.0;
        }
        self.rewards.iter().sum::<f32>() / self.rewards.len() as f32
    }
}

/// Device tensors for one TD3 update.
///
/// Observations are time-major `[T, N, F]`; rewards and the continuation
/// mask are `[N, 1]`; actions are `[N, A]`.
#[derive(Debug, Clone)]
pub struct BatchTensors<B: Backend> {
    pub observations: Tensor<B, 3>,
    pub actions: Tensor<B, 2>,
    pub rewards: Tensor<B, 2>,
    pub next_observations: Tensor<B, 3>,
    /// `1.0` where the episode continues, `0.0` on terminal transitions.
    pub continues: Tensor<B, 2>,
}

impl<B: Backend> BatchTensors<B> {
    pub fn from_batch(batch: &TransitionBatch, device: &B::Device) -> Result<Self, BatchError> {
        batch.validate()?;
        if batch.is_empty() {
            return Err(BatchError::Empty);
        }

        let n = batch.len();
        let (t, f, a) = (batch.window, batch.features, batch.action_dim);

        let time_major = |flat: &[f32]| {
            Tensor::<B, 1>::from_floats(flat, device)
                .reshape([n, t, f])
                .swap_dims(0, 1)
        };
        let continues: Vec<f32> = batch
            .dones
            .iter()
            .map(|&done| if done { 0.0 } else { 1.0 })
            .collect();

        Ok(Self {
            observations: time_major(&batch.observations),
            actions: Tensor::<B, 1>::from_floats(batch.actions.as_slice(), device).reshape([n, a]),
            rewards: Tensor::<B, 1>::from_floats(batch.rewards.as_slice(), device).reshape([n, 1]),
            next_observations: time_major(&batch.next_observations),
            continues: Tensor::<B, 1>::from_floats(continues.as_slice(), device).reshape([n, 1]),
        })
    }

    pub fn len(&self) -> usize {
        self.rewards.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
