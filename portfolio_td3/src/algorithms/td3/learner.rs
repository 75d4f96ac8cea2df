//! TD3 learner: owns the live estimators, their targets and optimizers.
//!
//! One call to [`Td3Learner::update_params`] performs:
//!
//! 1. a critic step on every iteration,
//! 2. on iterations where `iteration % policy_freq == 0`, an actor step
//!    followed by a soft update of both target networks.
//!
//! Targets never receive gradient steps.

use std::time::{Duration, Instant};

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor};

use crate::algorithms::td3::estimators::{PolicyEstimator, ValueEstimator};
use crate::algorithms::td3::losses::{
    actor_objective, bellman_target, smoothed_target_action, twin_critic_loss,
};
use crate::config::Td3Config;
use crate::core::batch::{BatchTensors, TransitionBatch};
use crate::core::grad_norm::clip_grad_norm;
use crate::core::target_network::soft_update;
use crate::error::{BatchError, ConfigError};

// ============================================================================
// Update output
// ============================================================================

/// Actor-side losses, present only on actor iterations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActorLosses {
    /// `-mean(Q1(s, π(s)))`.
    pub loss: f32,
    /// Weighted squared mean of the policy regularizer.
    pub actor_reg: f32,
    /// Weighted squared mean of the new action.
    pub action_reg: f32,
}

/// Result of one [`Td3Learner::update_params`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateOutput {
    pub critic_loss: f32,
    /// `None` when the actor was not updated this iteration.
    pub actor: Option<ActorLosses>,
    pub elapsed: Duration,
}

impl UpdateOutput {
    pub fn actor_updated(&self) -> bool {
        self.actor.is_some()
    }

    /// Actor loss, `0.0` when not computed.
    pub fn actor_loss(&self) -> f32 {
        self.actor.map_or(0.0, |a| a.loss)
    }

    /// Policy regularizer penalty, `0.0` when not computed.
    pub fn actor_reg(&self) -> f32 {
        self.actor.map_or(0.0, |a| a.actor_reg)
    }

    /// Action magnitude penalty, `0.0` when not computed.
    pub fn action_reg(&self) -> f32 {
        self.actor.map_or(0.0, |a| a.action_reg)
    }
}

// ============================================================================
// Optimizers
// ============================================================================

/// Plain Adam optimizers for the actor and the critic.
///
/// Actor gradients are clipped to `max_grad_norm` by the learner before
/// they reach the optimizer. The critic is never clipped.
pub fn adam_optimizers<B, P, V>() -> (impl Optimizer<P, B>, impl Optimizer<V, B>)
where
    B: AutodiffBackend,
    P: AutodiffModule<B>,
    V: AutodiffModule<B>,
{
    (AdamConfig::new().init::<B, P>(), AdamConfig::new().init::<B, V>())
}

// ============================================================================
// Learner
// ============================================================================

/// TD3 learner over a policy `P` and a twin critic `V`.
pub struct Td3Learner<B, P, V, PO, VO>
where
    B: AutodiffBackend,
    P: PolicyEstimator<B> + AutodiffModule<B>,
    V: ValueEstimator<B> + AutodiffModule<B>,
    PO: Optimizer<P, B>,
    VO: Optimizer<V, B>,
{
    policy: P,
    value: V,
    target_policy: P,
    target_value: V,
    policy_optimizer: PO,
    value_optimizer: VO,
    config: Td3Config,
    device: B::Device,
}

impl<B, P, V, PO, VO> Td3Learner<B, P, V, PO, VO>
where
    B: AutodiffBackend,
    P: PolicyEstimator<B> + AutodiffModule<B>,
    V: ValueEstimator<B> + AutodiffModule<B>,
    PO: Optimizer<P, B>,
    VO: Optimizer<V, B>,
{
    /// Build a learner whose targets start as exact, gradient-free copies of
    /// the live estimators.
    ///
    /// Fails when `config` does not pass [`Td3Config::validate`].
    pub fn new(
        policy: P,
        value: V,
        policy_optimizer: PO,
        value_optimizer: VO,
        config: Td3Config,
        device: B::Device,
    ) -> Result<Self, ConfigError> {
        let target_policy = policy.clone().no_grad();
        let target_value = value.clone().no_grad();
        Self::from_parts(
            policy,
            value,
            target_policy,
            target_value,
            policy_optimizer,
            value_optimizer,
            config,
            device,
        )
    }

    /// Build a learner from explicitly supplied targets.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        policy: P,
        value: V,
        target_policy: P,
        target_value: V,
        policy_optimizer: PO,
        value_optimizer: VO,
        config: Td3Config,
        device: B::Device,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            policy,
            value,
            target_policy: target_policy.no_grad(),
            target_value: target_value.no_grad(),
            policy_optimizer,
            value_optimizer,
            config,
            device,
        })
    }

    /// One TD3 update on `batch`.
    ///
    /// The critic steps on every call. When `iteration % policy_freq == 0`
    /// the actor also steps, with its gradients clipped to a global norm of
    /// `max_grad_norm`, and both targets are soft-updated.
    ///
    /// Estimator failures are not caught. A malformed batch is rejected
    /// before any parameter changes.
    ///
    /// # Arguments
    /// * `batch` - Transitions sampled from the last exploration round
    /// * `iteration` - Zero-based training iteration, drives the actor delay
    ///
    /// # Returns
    /// Critic loss, actor losses when the actor stepped, and wall time.
    ///
    /// # Example
    /// ```ignore
    /// let output = learner.update_params(&batch, iteration)?;
    /// if output.actor_updated() {
    ///     println!("actor loss {}", output.actor_loss());
    /// }
    /// ```
    pub fn update_params(
        &mut self,
        batch: &TransitionBatch,
        iteration: usize,
    ) -> Result<UpdateOutput, BatchError> {
        let start = Instant::now();
        let tensors = BatchTensors::<B>::from_batch(batch, &self.device)?;

        let critic_loss = self.critic_step(&tensors);

        let actor = if self.config.is_actor_iteration(iteration) {
            let losses = self.actor_step(&tensors);
            self.sync_targets();
            Some(losses)
        } else {
            None
        };

        Ok(UpdateOutput {
            critic_loss,
            actor,
            elapsed: start.elapsed(),
        })
    }

    fn critic_step(&mut self, batch: &BatchTensors<B>) -> f32 {
        let next_action = self
            .target_policy
            .action_detached(batch.next_observations.clone());
        let next_action = smoothed_target_action(next_action, &self.config);
        let target_twin = self
            .target_value
            .forward_detached(batch.next_observations.clone(), next_action);
        let target_q = bellman_target(
            batch.rewards.clone(),
            batch.continues.clone(),
            target_twin.min_q(),
            self.config.gamma,
        );

        let twin = self
            .value
            .forward(batch.observations.clone(), batch.actions.clone());
        let loss = twin_critic_loss(&twin, target_q);
        let loss_value = to_scalar(&loss);

        let grads = GradientsParams::from_grads(loss.backward(), &self.value);
        self.value = self
            .value_optimizer
            .step(self.config.critic_lr, self.value.clone(), grads);

        loss_value
    }

    fn actor_step(&mut self, batch: &BatchTensors<B>) -> ActorLosses {
        let output = self.policy.action_with_reg(batch.observations.clone());
        let q1 = self
            .value
            .q1(batch.observations.clone(), output.action.clone());
        let objective = actor_objective(q1, output.regularizer, output.action, &self.config);

        let losses = ActorLosses {
            loss: to_scalar(&objective.objective),
            actor_reg: to_scalar(&objective.actor_reg),
            action_reg: to_scalar(&objective.action_reg),
        };

        // Only the policy's gradients are applied; the critic path is discarded.
        let grads = GradientsParams::from_grads(objective.total().backward(), &self.policy);
        let (grads, _) = clip_grad_norm(&self.policy, grads, self.config.max_grad_norm);
        self.policy = self
            .policy_optimizer
            .step(self.config.actor_lr, self.policy.clone(), grads);

        losses
    }

    fn sync_targets(&mut self) {
        let tau = self.config.tau;
        self.target_policy = soft_update(&self.policy, self.target_policy.clone(), tau);
        self.target_value = soft_update(&self.value, self.target_value.clone(), tau);
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn target_policy(&self) -> &P {
        &self.target_policy
    }

    pub fn target_value(&self) -> &V {
        &self.target_value
    }

    pub fn config(&self) -> &Td3Config {
        &self.config
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Replace the live estimators, e.g. after loading a checkpoint.
    /// Targets are left as they are.
    pub fn load_estimators(&mut self, policy: P, value: V) {
        self.policy = policy;
        self.value = value;
    }
}

fn to_scalar<B: AutodiffBackend>(tensor: &Tensor<B, 1>) -> f32 {
    tensor.clone().into_scalar().elem::<f32>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    use crate::core::target_network::flat_parameters;
    use crate::nn::{MlpPolicy, MlpPolicyConfig, TwinMlpCritic, TwinMlpCriticConfig};

    type B = Autodiff<NdArray<f32>>;

    fn learner(
        config: Td3Config,
    ) -> Td3Learner<B, MlpPolicy<B>, TwinMlpCritic<B>, impl Optimizer<MlpPolicy<B>, B>, impl Optimizer<TwinMlpCritic<B>, B>>
    {
        let device = Default::default();
        let policy = MlpPolicyConfig::new(2, 1)
            .with_hidden_layers(vec![8])
            .init::<B>(&device);
        let value = TwinMlpCriticConfig::new(2, 1)
            .with_hidden_layers(vec![8])
            .init::<B>(&device);
        let (po, vo) = adam_optimizers::<B, MlpPolicy<B>, TwinMlpCritic<B>>();
        Td3Learner::new(policy, value, po, vo, config, device).unwrap()
    }

    fn batch() -> TransitionBatch {
        let mut batch = TransitionBatch::new(1, 2, 1);
        batch.push(&[0.1, 0.2], &[0.5], 1.0, &[0.2, 0.3], false).unwrap();
        batch.push(&[0.3, -0.1], &[-0.2], -0.5, &[0.0, 0.1], true).unwrap();
        batch
    }

    #[test]
    fn test_output_accessors_off_cycle() {
        let output = UpdateOutput {
            critic_loss: 1.5,
            actor: None,
            elapsed: Duration::ZERO,
        };
        assert!(!output.actor_updated());
        assert_eq!(output.actor_loss(), 0.0);
        assert_eq!(output.actor_reg(), 0.0);
        assert_eq!(output.action_reg(), 0.0);
    }

    #[test]
    fn test_targets_start_frozen() {
        let learner = learner(Td3Config::default());
        assert_eq!(
            flat_parameters(learner.target_policy()),
            flat_parameters(learner.policy())
        );
        assert_eq!(
            flat_parameters(learner.target_value()),
            flat_parameters(learner.value())
        );
    }

    #[test]
    fn test_actor_iteration_reports_losses() {
        let mut learner = learner(Td3Config::default());
        let output = learner.update_params(&batch(), 0).unwrap();

        assert!(output.actor_updated());
        assert!(output.critic_loss.is_finite());
        assert!(output.actor_reg() >= 0.0);
        assert!(output.action_reg() >= 0.0);
    }

    #[test]
    fn test_off_cycle_reports_sentinel() {
        let mut learner = learner(Td3Config::default());
        let output = learner.update_params(&batch(), 1).unwrap();

        assert!(output.actor.is_none());
        assert!(output.critic_loss.is_finite());
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let device = Default::default();
        let policy = MlpPolicyConfig::new(2, 1).init::<B>(&device);
        let value = TwinMlpCriticConfig::new(2, 1).init::<B>(&device);
        let (po, vo) = adam_optimizers::<B, MlpPolicy<B>, TwinMlpCritic<B>>();
        let mut config = Td3Config::default();
        config.policy_freq = 0;

        let result = Td3Learner::new(policy, value, po, vo, config, device);
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { field: "policy_freq", .. })
        ));
    }

    #[test]
    fn test_empty_batch_rejected() {
        let mut learner = learner(Td3Config::default());
        let result = learner.update_params(&TransitionBatch::new(1, 2, 1), 0);
        assert_eq!(result.unwrap_err(), BatchError::Empty);
    }
}
