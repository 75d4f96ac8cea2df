//! Portfolio environment contract and a synthetic market.
//!
//! An environment exposes a rolling window of per-asset features and accepts
//! one continuous action per step. Observations are flat
//! `window * features` vectors, oldest step first, matching the `[T, F]`
//! slice of a transition batch.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use thiserror::Error;

use crate::error::ConfigError;

/// Outcome of one environment step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvStep {
    pub reward: f32,
    /// Episode ended. The caller resets before the next step.
    pub done: bool,
    /// Portfolio value after the step.
    pub portfolio_value: f32,
}

/// A trading environment driven by continuous actions.
pub trait PortfolioEnv: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Number of steps in an observation.
    fn window(&self) -> usize;

    /// Features per step.
    fn features(&self) -> usize;

    fn action_dim(&self) -> usize;

    /// Start a new episode.
    fn reset(&mut self);

    /// Current observation, `window * features` values, oldest step first.
    fn observation(&self) -> Vec<f32>;

    fn step(&mut self, action: &[f32]) -> Result<EnvStep, Self::Error>;

    fn obs_dim(&self) -> usize {
        self.window() * self.features()
    }
}

// ============================================================================
// Synthetic market
// ============================================================================

/// Errors from [`SyntheticMarketEnv::step`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    #[error("expected {expected} action values, got {actual}")]
    ActionDim { expected: usize, actual: usize },
    #[error("action contains a non-finite value")]
    NonFiniteAction,
}

/// Settings of the synthetic random-walk market.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticMarketConfig {
    pub n_assets: usize,
    pub window: usize,
    pub episode_len: usize,
    /// Mean per-step log return of every asset.
    pub drift: f32,
    /// Std of per-step log returns.
    pub volatility: f32,
    pub seed: u64,
}

impl Default for SyntheticMarketConfig {
    fn default() -> Self {
        Self {
            n_assets: 3,
            window: 8,
            episode_len: 64,
            drift: 0.0005,
            volatility: 0.01,
            seed: 0,
        }
    }
}

impl SyntheticMarketConfig {
    pub fn new(n_assets: usize, window: usize) -> Self {
        Self {
            n_assets,
            window,
            ..Self::default()
        }
    }

    pub fn with_episode_len(mut self, episode_len: usize) -> Self {
        self.episode_len = episode_len;
        self
    }

    pub fn with_returns(mut self, drift: f32, volatility: f32) -> Self {
        self.drift = drift;
        self.volatility = volatility;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(&self) -> Result<SyntheticMarketEnv, ConfigError> {
        if self.n_assets == 0 {
            return Err(ConfigError::invalid("n_assets", "must be at least 1"));
        }
        if self.window == 0 {
            return Err(ConfigError::invalid("window", "must be at least 1"));
        }
        if self.episode_len == 0 {
            return Err(ConfigError::invalid("episode_len", "must be at least 1"));
        }
        let returns = Normal::new(self.drift, self.volatility)
            .map_err(|e| ConfigError::invalid("volatility", e.to_string()))?;

        let mut env = SyntheticMarketEnv {
            config: self.clone(),
            returns,
            rng: StdRng::seed_from_u64(self.seed),
            history: VecDeque::with_capacity(self.window),
            steps: 0,
            value: 1.0,
        };
        env.reset();
        Ok(env)
    }
}

/// Multi-asset geometric random walk.
///
/// Features are the per-asset log returns of the last `window` steps.
/// Actions are positions in `[-1, 1]` per asset; they are scaled down so
/// gross exposure never exceeds one. The reward is the log growth of the
/// portfolio value.
#[derive(Debug, Clone)]
pub struct SyntheticMarketEnv {
    config: SyntheticMarketConfig,
    returns: Normal<f32>,
    rng: StdRng,
    history: VecDeque<Vec<f32>>,
    steps: usize,
    value: f32,
}

impl SyntheticMarketEnv {
    fn draw_returns(&mut self) -> Vec<f32> {
        (0..self.config.n_assets)
            .map(|_| self.returns.sample(&mut self.rng))
            .collect()
    }

    pub fn portfolio_value(&self) -> f32 {
        self.value
    }

    pub fn steps(&self) -> usize {
        self.steps
    }
}

impl PortfolioEnv for SyntheticMarketEnv {
    type Error = MarketError;

    fn window(&self) -> usize {
        self.config.window
    }

    fn features(&self) -> usize {
        self.config.n_assets
    }

    fn action_dim(&self) -> usize {
        self.config.n_assets
    }

    fn reset(&mut self) {
        self.history.clear();
        for _ in 0..self.config.window {
            let row = self.draw_returns();
            self.history.push_back(row);
        }
        self.steps = 0;
        self.value = 1.0;
    }

    fn observation(&self) -> Vec<f32> {
        self.history.iter().flatten().copied().collect()
    }

    fn step(&mut self, action: &[f32]) -> Result<EnvStep, MarketError> {
        if action.len() != self.config.n_assets {
            return Err(MarketError::ActionDim {
                expected: self.config.n_assets,
                actual: action.len(),
            });
        }
        if action.iter().any(|a| !a.is_finite()) {
            return Err(MarketError::NonFiniteAction);
        }

        let positions: Vec<f32> = action.iter().map(|a| a.clamp(-1.0, 1.0)).collect();
        let gross: f32 = positions.iter().map(|p| p.abs()).sum();
        let scale = if gross > 1.0 { 1.0 / gross } else { 1.0 };

        let log_returns = self.draw_returns();
        let simple_return: f32 = positions
            .iter()
            .zip(&log_returns)
            .map(|(p, r)| p * scale * r.exp_m1())
            .sum();
        let growth = (1.0 + simple_return).max(1e-6);

        self.value *= growth;
        self.steps += 1;
        self.history.pop_front();
        self.history.push_back(log_returns);

        Ok(EnvStep {
            reward: growth.ln(),
            done: self.steps >= self.config.episode_len,
            portfolio_value: self.value,
        })
    }
}
