//! TD3 and training loop configuration.
//!
//! Configuration is plain data deserialized from TOML. Every field has a
//! default, so a file only needs to name what it overrides:
//!
//! ```toml
//! [td3]
//! gamma = 0.99
//! tau = 0.005
//!
//! [trainer]
//! max_iter_num = 5000
//! num_env = 4
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ============================================================================
// TD3 Configuration
// ============================================================================

/// Hyperparameters of the TD3 update step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Td3Config {
    // ========================================================================
    // Bellman target
    // ========================================================================
    /// Discount factor for bootstrapped values.
    pub gamma: f32,

    /// Polyak rate for the target networks.
    pub tau: f32,

    // ========================================================================
    // Target policy smoothing
    // ========================================================================
    /// Std of the Gaussian noise added to target actions.
    pub policy_noise: f32,

    /// Noise is clipped to `[-noise_clip, noise_clip]` before it is added.
    pub noise_clip: f32,

    /// Lower action bound (applied elementwise).
    pub action_low: f32,

    /// Upper action bound (applied elementwise).
    pub action_high: f32,

    // ========================================================================
    // Delayed actor updates
    // ========================================================================
    /// Actor and target networks update every `policy_freq` iterations.
    pub policy_freq: usize,

    /// Gradient norm clip for the actor. The critic path is not clipped.
    pub max_grad_norm: f32,

    /// Weight of `mean(aux^2)` in the actor loss.
    pub actor_reg_weight: f32,

    /// Weight of `mean(action^2)` in the actor loss.
    pub action_reg_weight: f32,

    // ========================================================================
    // Optimizers
    // ========================================================================
    /// Actor learning rate.
    pub actor_lr: f64,

    /// Critic learning rate.
    pub critic_lr: f64,
}

impl Default for Td3Config {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            tau: 0.005,
            policy_noise: 0.2,
            noise_clip: 0.2,
            action_low: -1.0,
            action_high: 1.0,
            policy_freq: 2,
            max_grad_norm: 0.5,
            actor_reg_weight: 1.0,
            action_reg_weight: 0.5,
            actor_lr: 1e-4,
            critic_lr: 1e-3,
        }
    }
}

impl Td3Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_tau(mut self, tau: f32) -> Self {
        self.tau = tau;
        self
    }

    pub fn with_policy_noise(mut self, policy_noise: f32) -> Self {
        self.policy_noise = policy_noise;
        self
    }

    pub fn with_noise_clip(mut self, noise_clip: f32) -> Self {
        self.noise_clip = noise_clip;
        self
    }

    pub fn with_action_bounds(mut self, low: f32, high: f32) -> Self {
        self.action_low = low;
        self.action_high = high;
        self
    }

    pub fn with_max_grad_norm(mut self, max_grad_norm: f32) -> Self {
        self.max_grad_norm = max_grad_norm;
        self
    }

    pub fn with_learning_rates(mut self, actor_lr: f64, critic_lr: f64) -> Self {
        self.actor_lr = actor_lr;
        self.critic_lr = critic_lr;
        self
    }

    /// Whether the actor and targets update at this iteration.
    pub fn is_actor_iteration(&self, iteration: usize) -> bool {
        iteration % self.policy_freq == 0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(ConfigError::invalid("gamma", format!("{} not in [0, 1]", self.gamma)));
        }
        if !(self.tau > 0.0 && self.tau <= 1.0) {
            return Err(ConfigError::invalid("tau", format!("{} not in (0, 1]", self.tau)));
        }
        if self.policy_noise < 0.0 {
            return Err(ConfigError::invalid("policy_noise", "must be non-negative"));
        }
        if self.noise_clip < 0.0 {
            return Err(ConfigError::invalid("noise_clip", "must be non-negative"));
        }
        if self.action_low >= self.action_high {
            return Err(ConfigError::invalid(
                "action_low",
                format!("{} >= action_high {}", self.action_low, self.action_high),
            ));
        }
        if self.policy_freq == 0 {
            return Err(ConfigError::invalid("policy_freq", "must be at least 1"));
        }
        if self.max_grad_norm <= 0.0 {
            return Err(ConfigError::invalid("max_grad_norm", "must be positive"));
        }
        Ok(())
    }
}

// ============================================================================
// Trainer Configuration
// ============================================================================

/// Settings of the outer exploration/update loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Number of loop iterations (one exploration round + one update each).
    pub max_iter_num: usize,

    /// Iterations between consolidated progress messages.
    pub log_interval: usize,

    /// Number of exploration environments. 1 selects single-env exploration.
    pub num_env: usize,

    /// Transitions collected per round, split across environments.
    pub round_size: usize,

    /// Random-action steps per environment before learning starts.
    pub warmup_steps: usize,

    /// Std of the Gaussian noise added to exploration actions.
    pub exploration_noise: f32,

    /// Seed for exploration noise and synthetic environments.
    pub seed: u64,

    /// Directory receiving model checkpoints and the best portfolio record.
    pub model_dir: PathBuf,

    /// File overwritten every iteration with `"<iteration>,<max_iter_num>"`.
    pub progress_bar_path: PathBuf,

    /// Optional CSV telemetry output.
    pub telemetry_path: Option<PathBuf>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_iter_num: 1_000,
            log_interval: 10,
            num_env: 1,
            round_size: 64,
            warmup_steps: 32,
            exploration_noise: 0.1,
            seed: 42,
            model_dir: PathBuf::from("./models"),
            progress_bar_path: PathBuf::from("./progress.txt"),
            telemetry_path: None,
        }
    }
}

impl TrainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iter_num(mut self, max_iter_num: usize) -> Self {
        self.max_iter_num = max_iter_num;
        self
    }

    pub fn with_log_interval(mut self, log_interval: usize) -> Self {
        self.log_interval = log_interval;
        self
    }

    pub fn with_num_env(mut self, num_env: usize) -> Self {
        self.num_env = num_env;
        self
    }

    pub fn with_round_size(mut self, round_size: usize) -> Self {
        self.round_size = round_size;
        self
    }

    pub fn with_warmup_steps(mut self, warmup_steps: usize) -> Self {
        self.warmup_steps = warmup_steps;
        self
    }

    pub fn with_exploration_noise(mut self, exploration_noise: f32) -> Self {
        self.exploration_noise = exploration_noise;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_model_dir(mut self, model_dir: impl Into<PathBuf>) -> Self {
        self.model_dir = model_dir.into();
        self
    }

    pub fn with_progress_bar_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.progress_bar_path = path.into();
        self
    }

    pub fn with_telemetry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.telemetry_path = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_env == 0 {
            return Err(ConfigError::invalid("num_env", "must be at least 1"));
        }
        if self.log_interval == 0 {
            return Err(ConfigError::invalid("log_interval", "must be at least 1"));
        }
        if self.round_size == 0 {
            return Err(ConfigError::invalid("round_size", "must be at least 1"));
        }
        if self.round_size < self.num_env {
            return Err(ConfigError::invalid(
                "round_size",
                format!("{} is smaller than num_env {}", self.round_size, self.num_env),
            ));
        }
        if self.exploration_noise < 0.0 {
            return Err(ConfigError::invalid("exploration_noise", "must be non-negative"));
        }
        Ok(())
    }
}

// ============================================================================
// Agent Configuration
// ============================================================================

/// Complete configuration file: `[td3]` and `[trainer]` tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub td3: Td3Config,
    pub trainer: TrainerConfig,
}

impl AgentConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.td3.validate()?;
        self.trainer.validate()
    }
}
