//! TD3 loss building blocks.
//!
//! Each function is one step of the update and is tested on its own:
//!
//! ```text
//! a'      = clamp(π_targ(s') + clamp(ε, -c, c), low, high)    ε ~ N(0, σ)
//! y       = r + γ · (1 - d) · min(Q1_targ(s', a'), Q2_targ(s', a'))
//! L_Q     = MSE(Q1(s, a), y) + MSE(Q2(s, a), y)
//! L_π     = -mean(Q1(s, π(s))) + w_aux · mean(aux²) + w_act · mean(π(s)²)
//! ```

use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};

use crate::algorithms::td3::estimators::TwinQ;
use crate::config::Td3Config;

/// Target policy smoothing.
///
/// Adds clipped Gaussian noise to the target policy's action and clamps the
/// result to the action bounds. The returned tensor is detached.
pub fn smoothed_target_action<B: Backend>(
    target_action: Tensor<B, 2>,
    config: &Td3Config,
) -> Tensor<B, 2> {
    let noisy = if config.policy_noise > 0.0 {
        let noise = Tensor::<B, 2>::random(
            target_action.shape(),
            Distribution::Normal(0.0, config.policy_noise as f64),
            &target_action.device(),
        )
        .clamp(-config.noise_clip, config.noise_clip);
        target_action + noise
    } else {
        target_action
    };

    noisy
        .clamp(config.action_low, config.action_high)
        .detach()
}

/// Bootstrapped critic target `r + γ · continues · min_q`, detached.
///
/// All inputs are `[N, 1]`; `continues` is `0` on terminal transitions so
/// those targets reduce to the reward.
pub fn bellman_target<B: Backend>(
    rewards: Tensor<B, 2>,
    continues: Tensor<B, 2>,
    min_target_q: Tensor<B, 2>,
    gamma: f32,
) -> Tensor<B, 2> {
    (rewards + continues * min_target_q.mul_scalar(gamma)).detach()
}

/// Sum of the mean squared errors of both heads against `target_q`.
pub fn twin_critic_loss<B: Backend>(twin: &TwinQ<B>, target_q: Tensor<B, 2>) -> Tensor<B, 1> {
    let q1_loss = (twin.q1.clone() - target_q.clone()).powf_scalar(2.0).mean();
    let q2_loss = (twin.q2.clone() - target_q).powf_scalar(2.0).mean();
    q1_loss + q2_loss
}

/// Terms of the regularized actor loss.
#[derive(Debug, Clone)]
pub struct ActorObjective<B: Backend> {
    /// `-mean(Q1)`.
    pub objective: Tensor<B, 1>,
    /// Weighted `mean(aux²)`.
    pub actor_reg: Tensor<B, 1>,
    /// Weighted `mean(action²)`.
    pub action_reg: Tensor<B, 1>,
}

impl<B: Backend> ActorObjective<B> {
    /// Loss the actor optimizer minimizes.
    pub fn total(&self) -> Tensor<B, 1> {
        self.objective.clone() + self.actor_reg.clone() + self.action_reg.clone()
    }
}

/// Actor loss from `Q1(s, π(s))`, the policy's regularizer and its action.
pub fn actor_objective<B: Backend>(
    q1: Tensor<B, 2>,
    regularizer: Tensor<B, 2>,
    action: Tensor<B, 2>,
    config: &Td3Config,
) -> ActorObjective<B> {
    ActorObjective {
        objective: q1.mean().neg(),
        actor_reg: regularizer
            .powf_scalar(2.0)
            .mean()
            .mul_scalar(config.actor_reg_weight),
        action_reg: action
            .powf_scalar(2.0)
            .mean()
            .mul_scalar(config.action_reg_weight),
    }
}
