//! Reference MLP estimators.
//!
//! Both networks read only the newest observation step. They are small
//! baselines for the synthetic market and for tests; any module that
//! implements the estimator traits can replace them.

use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

use crate::algorithms::td3::estimators::{
    latest_timestep, PolicyEstimator, PolicyOutput, TwinQ, ValueEstimator,
};

// ============================================================================
// MLP
// ============================================================================

/// Feed-forward stack: ReLU on hidden layers, linear output.
#[derive(Config, Debug)]
pub struct MlpConfig {
    pub input_dim: usize,
    pub output_dim: usize,
    #[config(default = "vec![64, 64]")]
    pub hidden_layers: Vec<usize>,
}

impl MlpConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        let mut dims = Vec::with_capacity(self.hidden_layers.len() + 2);
        dims.push(self.input_dim);
        dims.extend_from_slice(&self.hidden_layers);
        dims.push(self.output_dim);

        let layers = dims
            .windows(2)
            .map(|pair| LinearConfig::new(pair[0], pair[1]).init(device))
            .collect();

        Mlp { layers }
    }
}

#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    layers: Vec<Linear<B>>,
}

impl<B: Backend> Mlp<B> {
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len() - 1;
        self.layers
            .iter()
            .enumerate()
            .fold(input, |x, (i, layer)| {
                let x = layer.forward(x);
                if i < last {
                    relu(x)
                } else {
                    x
                }
            })
    }
}

// ============================================================================
// Policy
// ============================================================================

#[derive(Config, Debug)]
pub struct MlpPolicyConfig {
    /// Features per observation step.
    pub features: usize,
    pub action_dim: usize,
    #[config(default = "vec![64, 64]")]
    pub hidden_layers: Vec<usize>,
    #[config(default = "-1.0")]
    pub action_low: f32,
    #[config(default = "1.0")]
    pub action_high: f32,
}

impl MlpPolicyConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MlpPolicy<B> {
        MlpPolicy {
            body: MlpConfig::new(self.features, self.action_dim)
                .with_hidden_layers(self.hidden_layers.clone())
                .init(device),
            action_dim: self.action_dim,
            action_low: self.action_low,
            action_high: self.action_high,
        }
    }
}

/// Tanh policy rescaled to `[action_low, action_high]`.
///
/// The pre-activation output is returned as the regularizer so large
/// logits that saturate the tanh get penalized.
#[derive(Module, Debug)]
pub struct MlpPolicy<B: Backend> {
    body: Mlp<B>,
    action_dim: usize,
    action_low: f32,
    action_high: f32,
}

impl<B: Backend> MlpPolicy<B> {
    fn squash(&self, logits: Tensor<B, 2>) -> Tensor<B, 2> {
        let half_range = 0.5 * (self.action_high - self.action_low);
        logits
            .tanh()
            .add_scalar(1.0)
            .mul_scalar(half_range)
            .add_scalar(self.action_low)
    }
}

impl<B: Backend> PolicyEstimator<B> for MlpPolicy<B> {
    fn action(&self, obs: Tensor<B, 3>) -> Tensor<B, 2> {
        self.squash(self.body.forward(latest_timestep(obs)))
    }

    fn action_with_reg(&self, obs: Tensor<B, 3>) -> PolicyOutput<B> {
        let logits = self.body.forward(latest_timestep(obs));
        PolicyOutput {
            action: self.squash(logits.clone()),
            regularizer: logits,
        }
    }

    fn action_dim(&self) -> usize {
        self.action_dim
    }
}

// ============================================================================
// Twin critic
// ============================================================================

#[derive(Config, Debug)]
pub struct TwinMlpCriticConfig {
    pub features: usize,
    pub action_dim: usize,
    #[config(default = "vec![64, 64]")]
    pub hidden_layers: Vec<usize>,
}

impl TwinMlpCriticConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TwinMlpCritic<B> {
        let head = MlpConfig::new(self.features + self.action_dim, 1)
            .with_hidden_layers(self.hidden_layers.clone());
        TwinMlpCritic {
            q1_net: head.init(device),
            q2_net: head.init(device),
        }
    }
}

/// Two independent heads on `[obs_latest | action]`.
#[derive(Module, Debug)]
pub struct TwinMlpCritic<B: Backend> {
    q1_net: Mlp<B>,
    q2_net: Mlp<B>,
}

impl<B: Backend> TwinMlpCritic<B> {
    fn joint_input(obs: Tensor<B, 3>, action: Tensor<B, 2>) -> Tensor<B, 2> {
        Tensor::cat(vec![latest_timestep(obs), action], 1)
    }
}

impl<B: Backend> ValueEstimator<B> for TwinMlpCritic<B> {
    fn forward(&self, obs: Tensor<B, 3>, action: Tensor<B, 2>) -> TwinQ<B> {
        let input = Self::joint_input(obs, action);
        TwinQ::new(self.q1_net.forward(input.clone()), self.q2_net.forward(input))
    }

    fn q1(&self, obs: Tensor<B, 3>, action: Tensor<B, 2>) -> Tensor<B, 2> {
        self.q1_net.forward(Self::joint_input(obs, action))
    }
}
