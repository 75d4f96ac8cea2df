//! Experience collection.
//!
//! Two strategies produce one [`ExplorationRound`] per training iteration:
//!
//! - [`SingleEnvExploration`]: one environment stepped on the calling thread.
//! - [`MultiEnvExploration`]: `num_env` environments on scoped worker threads.
//!   The learner publishes a policy snapshot to a [`PolicySlot`]; each worker
//!   rebuilds a policy from its factory, loads the snapshot and rolls out.
//!   Workers never touch the learner's parameters.
//!
//! ```text
//! learner ── publish ──> PolicySlot ──> worker 0 ─┐
//!                                  ├──> worker 1 ─┼─> concat (worker order)
//!                                  └──> worker N ─┘
//! ```
//!
//! Inference always runs on the gradient-free `valid()` copy of the policy.

use std::marker::PhantomData;
use std::time::{Duration, Instant};

use burn::module::AutodiffModule;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::algorithms::td3::PolicyEstimator;
use crate::config::{Td3Config, TrainerConfig};
use crate::core::batch::TransitionBatch;
use crate::core::policy_slot::PolicySlot;
use crate::environment::PortfolioEnv;
use crate::error::ExplorationError;

type InnerDevice<B> = <<B as AutodiffBackend>::InnerBackend as Backend>::Device;

// ============================================================================
// Round output
// ============================================================================

/// Everything one exploration round hands to the training loop.
#[derive(Debug, Clone)]
pub struct ExplorationRound {
    pub batch: TransitionBatch,
    /// Mean per-step reward of the round.
    pub avg_reward: f32,
    pub elapsed: Duration,
    /// Portfolio value after every step, in step order.
    pub portfolio_values: Vec<f32>,
}

/// Source of transition batches for the training loop.
pub trait Exploration<B, P>
where
    B: AutodiffBackend,
    P: AutodiffModule<B>,
{
    /// Prime the environments before learning starts.
    fn warm_up(&mut self, policy: &P) -> Result<(), ExplorationError>;

    /// Collect one round with the current policy.
    fn explore(&mut self, policy: &P) -> Result<ExplorationRound, ExplorationError>;
}

// ============================================================================
// Shared per-environment rollout
// ============================================================================

/// Action noise and bounds applied during rollouts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseSettings {
    pub exploration_noise: f32,
    pub action_low: f32,
    pub action_high: f32,
    pub warmup_steps: usize,
}

impl NoiseSettings {
    pub fn from_config(td3: &Td3Config, trainer: &TrainerConfig) -> Self {
        Self {
            exploration_noise: trainer.exploration_noise,
            action_low: td3.action_low,
            action_high: td3.action_high,
            warmup_steps: trainer.warmup_steps,
        }
    }
}

/// Steps collected by one environment.
#[derive(Debug, Clone)]
struct Rollout {
    batch: TransitionBatch,
    portfolio_values: Vec<f32>,
}

/// One environment with its own noise generator.
#[derive(Debug)]
struct EnvWorker<E> {
    id: usize,
    env: E,
    rng: StdRng,
    noise: NoiseSettings,
}

impl<E: PortfolioEnv> EnvWorker<E> {
    fn new(id: usize, mut env: E, seed: u64, noise: NoiseSettings) -> Self {
        env.reset();
        Self {
            id,
            env,
            rng: StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
            noise,
        }
    }

    fn env_error(&self, source: E::Error) -> ExplorationError {
        ExplorationError::Environment {
            env_id: self.id,
            source: Box::new(source),
        }
    }

    /// Random actions, nothing recorded. Leaves a freshly reset episode.
    fn warm_up(&mut self) -> Result<(), ExplorationError> {
        self.env.reset();
        let (low, high) = (self.noise.action_low, self.noise.action_high);
        for _ in 0..self.noise.warmup_steps {
            let action: Vec<f32> = (0..self.env.action_dim())
                .map(|_| self.rng.gen_range(low..=high))
                .collect();
            let step = self.env.step(&action).map_err(|e| self.env_error(e))?;
            if step.done {
                self.env.reset();
            }
        }
        self.env.reset();
        Ok(())
    }

    fn act<IB, PI>(&mut self, policy: &PI, obs: &[f32], device: &IB::Device) -> Result<Vec<f32>, ExplorationError>
    where
        IB: Backend,
        PI: PolicyEstimator<IB>,
    {
        // With N = 1, [T, N, F] and [N, T, F] share the same layout.
        let obs = Tensor::<IB, 1>::from_floats(obs, device).reshape([
            self.env.window(),
            1,
            self.env.features(),
        ]);
        let action = policy
            .action(obs)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| ExplorationError::Inference(format!("{e:?}")))?;

        let std = self.noise.exploration_noise;
        Ok(action
            .into_iter()
            .map(|a| {
                let noise = if std > 0.0 {
                    self.rng.sample::<f32, _>(StandardNormal) * std
                } else {
                    0.0
                };
                (a + noise).clamp(self.noise.action_low, self.noise.action_high)
            })
            .collect())
    }

    fn collect<IB, PI>(
        &mut self,
        policy: &PI,
        steps: usize,
        device: &IB::Device,
    ) -> Result<Rollout, ExplorationError>
    where
        IB: Backend,
        PI: PolicyEstimator<IB>,
    {
        let mut batch = TransitionBatch::new(
            self.env.window(),
            self.env.features(),
            self.env.action_dim(),
        );
        let mut portfolio_values = Vec::with_capacity(steps);

        let mut obs = self.env.observation();
        for _ in 0..steps {
            let action = self.act::<IB, PI>(policy, &obs, device)?;
            let step = self.env.step(&action).map_err(|e| self.env_error(e))?;
            let next_obs = self.env.observation();

            batch.push(&obs, &action, step.reward, &next_obs, step.done)?;
            portfolio_values.push(step.portfolio_value);

            obs = if step.done {
                self.env.reset();
                self.env.observation()
            } else {
                next_obs
            };
        }

        Ok(Rollout {
            batch,
            portfolio_values,
        })
    }
}

fn into_round(rollouts: Vec<Rollout>, start: Instant) -> Result<ExplorationRound, ExplorationError> {
    let mut parts = rollouts.into_iter();
    let Some(first) = parts.next() else {
        return Err(ExplorationError::Batch(crate::error::BatchError::Empty));
    };

    let mut batch = first.batch;
    let mut portfolio_values = first.portfolio_values;
    for rollout in parts {
        batch.append(rollout.batch)?;
        portfolio_values.extend(rollout.portfolio_values);
    }

    Ok(ExplorationRound {
        avg_reward: batch.mean_reward(),
        batch,
        elapsed: start.elapsed(),
        portfolio_values,
    })
}

// ============================================================================
// Single environment
// ============================================================================

/// Rolls out `round_size` steps of one environment per round.
pub struct SingleEnvExploration<B: AutodiffBackend, E> {
    worker: EnvWorker<E>,
    round_size: usize,
    device: InnerDevice<B>,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend, E: PortfolioEnv> SingleEnvExploration<B, E> {
    pub fn new(env: E, round_size: usize, seed: u64, noise: NoiseSettings) -> Self {
        Self {
            worker: EnvWorker::new(0, env, seed, noise),
            round_size,
            device: Default::default(),
            _backend: PhantomData,
        }
    }

    pub fn with_device(mut self, device: InnerDevice<B>) -> Self {
        self.device = device;
        self
    }

    pub fn env(&self) -> &E {
        &self.worker.env
    }
}

impl<B, P, E> Exploration<B, P> for SingleEnvExploration<B, E>
where
    B: AutodiffBackend,
    P: PolicyEstimator<B> + AutodiffModule<B>,
    P::InnerModule: PolicyEstimator<B::InnerBackend>,
    E: PortfolioEnv,
{
    fn warm_up(&mut self, _policy: &P) -> Result<(), ExplorationError> {
        self.worker.warm_up()
    }

    fn explore(&mut self, policy: &P) -> Result<ExplorationRound, ExplorationError> {
        let start = Instant::now();
        let inference = policy.valid();
        let rollout = self.worker.collect::<B::InnerBackend, _>(
            &inference,
            self.round_size,
            &self.device,
        )?;
        into_round(vec![rollout], start)
    }
}

// ============================================================================
// Multiple environments
// ============================================================================

/// Rolls out `num_env` environments in parallel, one scoped thread each.
///
/// `factory` builds an inference policy on the worker's device; its
/// parameters are then replaced with the published snapshot.
pub struct MultiEnvExploration<B: AutodiffBackend, PI, E, F> {
    workers: Vec<EnvWorker<E>>,
    steps_per_env: Vec<usize>,
    slot: PolicySlot,
    factory: F,
    device: InnerDevice<B>,
    _policy: PhantomData<fn() -> PI>,
}

impl<B, PI, E, F> MultiEnvExploration<B, PI, E, F>
where
    B: AutodiffBackend,
    PI: PolicyEstimator<B::InnerBackend>,
    E: PortfolioEnv,
    F: Fn(&InnerDevice<B>) -> PI + Sync,
{
    /// `envs` are assigned worker ids in order. `round_size` is split across
    /// them, the remainder going to the first workers.
    pub fn new(
        envs: Vec<E>,
        factory: F,
        round_size: usize,
        seed: u64,
        noise: NoiseSettings,
    ) -> Self {
        let num_env = envs.len().max(1);
        let base = round_size / num_env;
        let extra = round_size % num_env;
        let steps_per_env = (0..envs.len())
            .map(|i| base + usize::from(i < extra))
            .collect();
        let workers = envs
            .into_iter()
            .enumerate()
            .map(|(id, env)| EnvWorker::new(id, env, seed, noise))
            .collect();

        Self {
            workers,
            steps_per_env,
            slot: PolicySlot::new(),
            factory,
            device: Default::default(),
            _policy: PhantomData,
        }
    }

    pub fn with_device(mut self, device: InnerDevice<B>) -> Self {
        self.device = device;
        self
    }

    pub fn num_env(&self) -> usize {
        self.workers.len()
    }

    /// Snapshot slot shared with the workers.
    pub fn slot(&self) -> &PolicySlot {
        &self.slot
    }

    fn run_workers<T, W>(&mut self, work: W) -> Result<Vec<T>, ExplorationError>
    where
        T: Send,
        W: Fn(&mut EnvWorker<E>, usize, &PolicySlot, &F, &InnerDevice<B>) -> Result<T, ExplorationError>
            + Sync,
    {
        let slot = &self.slot;
        let factory = &self.factory;
        let work = &work;

        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .workers
                .iter_mut()
                .zip(self.steps_per_env.iter().copied())
                .map(|(worker, steps)| {
                    let device = self.device.clone();
                    let id = worker.id;
                    let handle =
                        scope.spawn(move || work(worker, steps, slot, factory, &device));
                    (id, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(id, handle)| {
                    handle
                        .join()
                        .unwrap_or(Err(ExplorationError::WorkerPanicked(id)))
                })
                .collect()
        })
    }
}

impl<B, P, PI, E, F> Exploration<B, P> for MultiEnvExploration<B, PI, E, F>
where
    B: AutodiffBackend,
    P: PolicyEstimator<B> + AutodiffModule<B, InnerModule = PI>,
    PI: PolicyEstimator<B::InnerBackend>,
    E: PortfolioEnv,
    F: Fn(&InnerDevice<B>) -> PI + Sync,
{
    fn warm_up(&mut self, _policy: &P) -> Result<(), ExplorationError> {
        self.run_workers(|worker, _, _, _, _| worker.warm_up())?;
        Ok(())
    }

    fn explore(&mut self, policy: &P) -> Result<ExplorationRound, ExplorationError> {
        let start = Instant::now();
        self.slot
            .publish_module::<B::InnerBackend, _>(&policy.valid())?;

        let rollouts = self.run_workers(|worker, steps, slot, factory, device| {
            let local = slot.load_into::<B::InnerBackend, _>(factory(device), device)?;
            worker.collect::<B::InnerBackend, _>(&local, steps, device)
        })?;

        into_round(rollouts, start)
    }
}

// ============================================================================
// Strategy selection
// ============================================================================

/// Exploration strategy fixed at construction.
pub enum ExplorationStrategy<B: AutodiffBackend, PI, E, F> {
    Single(SingleEnvExploration<B, E>),
    Multi(MultiEnvExploration<B, PI, E, F>),
}

impl<B, PI, E, F> ExplorationStrategy<B, PI, E, F>
where
    B: AutodiffBackend,
    PI: PolicyEstimator<B::InnerBackend>,
    E: PortfolioEnv,
    F: Fn(&InnerDevice<B>) -> PI + Sync,
{
    /// Single-environment exploration when `num_env == 1`, otherwise one
    /// worker per environment. `make_env` receives the worker id; its first
    /// error aborts construction.
    pub fn from_config<Err>(
        td3: &Td3Config,
        trainer: &TrainerConfig,
        mut make_env: impl FnMut(usize) -> Result<E, Err>,
        policy_factory: F,
    ) -> Result<Self, Err> {
        let noise = NoiseSettings::from_config(td3, trainer);
        let strategy = if trainer.num_env <= 1 {
            ExplorationStrategy::Single(SingleEnvExploration::new(
                make_env(0)?,
                trainer.round_size,
                trainer.seed,
                noise,
            ))
        } else {
            let envs = (0..trainer.num_env)
                .map(&mut make_env)
                .collect::<Result<Vec<_>, Err>>()?;
            ExplorationStrategy::Multi(MultiEnvExploration::new(
                envs,
                policy_factory,
                trainer.round_size,
                trainer.seed,
                noise,
            ))
        };
        Ok(strategy)
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, ExplorationStrategy::Multi(_))
    }
}

impl<B, P, PI, E, F> Exploration<B, P> for ExplorationStrategy<B, PI, E, F>
where
    B: AutodiffBackend,
    P: PolicyEstimator<B> + AutodiffModule<B, InnerModule = PI>,
    PI: PolicyEstimator<B::InnerBackend>,
    E: PortfolioEnv,
    F: Fn(&InnerDevice<B>) -> PI + Sync,
{
    fn warm_up(&mut self, policy: &P) -> Result<(), ExplorationError> {
        match self {
            ExplorationStrategy::Single(single) => single.warm_up(policy),
            ExplorationStrategy::Multi(multi) => multi.warm_up(policy),
        }
    }

    fn explore(&mut self, policy: &P) -> Result<ExplorationRound, ExplorationError> {
        match self {
            ExplorationStrategy::Single(single) => single.explore(policy),
            ExplorationStrategy::Multi(multi) => multi.explore(policy),
        }
    }
}
