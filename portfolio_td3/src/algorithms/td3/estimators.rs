//! Capability traits for the policy and twin critic.
//!
//! The TD3 update only needs these contracts; any architecture that
//! implements them can be trained. Observations are passed time-major
//! `[T, N, F]` and implementations usually read the newest step through
//! [`latest_timestep`].

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

// ============================================================================
// Outputs
// ============================================================================

/// Action plus the auxiliary signal penalized during actor updates.
#[derive(Debug, Clone)]
pub struct PolicyOutput<B: Backend> {
    /// Bounded action `[N, action_dim]`.
    pub action: Tensor<B, 2>,
    /// Auxiliary tensor whose squared mean is added to the actor loss.
    pub regularizer: Tensor<B, 2>,
}

/// Estimates from both critic heads, each `[N, 1]`.
#[derive(Debug, Clone)]
pub struct TwinQ<B: Backend> {
    pub q1: Tensor<B, 2>,
    pub q2: Tensor<B, 2>,
}

impl<B: Backend> TwinQ<B> {
    pub fn new(q1: Tensor<B, 2>, q2: Tensor<B, 2>) -> Self {
        Self { q1, q2 }
    }

    /// Elementwise minimum of the two heads.
    pub fn min_q(&self) -> Tensor<B, 2> {
        self.q1.clone().min_pair(self.q2.clone())
    }

    pub fn batch_size(&self) -> usize {
        self.q1.dims()[0]
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Deterministic policy mapping observations to bounded actions.
pub trait PolicyEstimator<B: Backend>: Module<B> {
    /// Action for time-major observations `[T, N, F]`.
    fn action(&self, obs: Tensor<B, 3>) -> Tensor<B, 2>;

    /// Action together with its regularization signal.
    fn action_with_reg(&self, obs: Tensor<B, 3>) -> PolicyOutput<B>;

    fn action_dim(&self) -> usize;

    /// Action cut from the autodiff graph.
    fn action_detached(&self, obs: Tensor<B, 3>) -> Tensor<B, 2> {
        self.action(obs).detach()
    }
}

/// Twin state-action value estimator.
pub trait ValueEstimator<B: Backend>: Module<B> {
    /// Both heads at `(obs, action)`.
    fn forward(&self, obs: Tensor<B, 3>, action: Tensor<B, 2>) -> TwinQ<B>;

    /// First head only. Used for the policy gradient.
    fn q1(&self, obs: Tensor<B, 3>, action: Tensor<B, 2>) -> Tensor<B, 2> {
        self.forward(obs, action).q1
    }

    /// Both heads, cut from the autodiff graph.
    fn forward_detached(&self, obs: Tensor<B, 3>, action: Tensor<B, 2>) -> TwinQ<B> {
        let twin = self.forward(obs, action);
        TwinQ::new(twin.q1.detach(), twin.q2.detach())
    }
}

/// Newest step `[N, F]` of time-major observations `[T, N, F]`.
pub fn latest_timestep<B: Backend>(obs: Tensor<B, 3>) -> Tensor<B, 2> {
    let [t, n, f] = obs.dims();
    obs.narrow(0, t - 1, 1).reshape([n, f])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_latest_timestep_selects_last_slice() {
        let device = Default::default();
        // T=3, N=2, F=2
        let obs = Tensor::<TestBackend, 1>::from_floats(
            [
                0.0, 0.0, 0.0, 0.0, //
                1.0, 1.0, 1.0, 1.0, //
                2.0, 3.0, 4.0, 5.0,
            ],
            &device,
        )
        .reshape([3, 2, 2]);

        let latest = latest_timestep(obs);

        assert_eq!(latest.dims(), [2, 2]);
        assert_eq!(
            latest.into_data().to_vec::<f32>().unwrap(),
            vec![2.0, 3.0, 4.0, 5.0]
        );
    }

    #[test]
    fn test_twin_min() {
        let device = Default::default();
        let q1 = Tensor::<TestBackend, 1>::from_floats([1.0, -2.0, 3.0], &device).reshape([3, 1]);
        let q2 = Tensor::<TestBackend, 1>::from_floats([0.5, 4.0, 3.0], &device).reshape([3, 1]);

        let twin = TwinQ::new(q1, q2);

        assert_eq!(twin.batch_size(), 3);
        assert_eq!(
            twin.min_q().into_data().to_vec::<f32>().unwrap(),
            vec![0.5, -2.0, 3.0]
        );
    }
}
