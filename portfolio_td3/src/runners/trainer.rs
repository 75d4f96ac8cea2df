//! TD3 training loop.
//!
//! ```text
//! WARMUP → { EXPLORE → REPORT portfolio → UPDATE → REPORT losses }* → FINALIZE
//! ```
//!
//! Every iteration:
//! 1. overwrite the progress marker with `"<iteration>,<max_iter_num>"`,
//! 2. collect one exploration round,
//! 3. for each realized portfolio value: advance the global step, emit
//!    `reward/portfolio`, and save the models when the best value strictly
//!    improves,
//! 4. run one TD3 update with the iteration index,
//! 5. emit update metrics on actor iterations and a progress line every
//!    `log_interval` iterations,
//! 6. release transient device memory.
//!
//! Exploration and update errors end the run. Telemetry, progress marker and
//! checkpoint failures are logged and training continues.

use std::time::{Duration, Instant};

use burn::module::AutodiffModule;
use burn::optim::Optimizer;
use burn::tensor::backend::AutodiffBackend;
use tracing::{info, warn};

use crate::algorithms::td3::{PolicyEstimator, Td3Learner, UpdateOutput, ValueEstimator};
use crate::checkpoint::CheckpointStore;
use crate::config::TrainerConfig;
use crate::error::Td3Error;
use crate::metrics::telemetry::tags;
use crate::metrics::{ProgressMarker, Telemetry};
use crate::runners::exploration::Exploration;
use crate::runners::memory::{MemoryReclaimer, NoopReclaimer};

// ============================================================================
// Best portfolio
// ============================================================================

/// Running maximum of realized portfolio values.
///
/// Owned by the caller and lent to [`Td3Trainer::learn`], so a resumed run
/// can start from a previously recorded best.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestPortfolio {
    value: f32,
}

impl Default for BestPortfolio {
    fn default() -> Self {
        Self {
            value: f32::NEG_INFINITY,
        }
    }
}

impl BestPortfolio {
    pub fn new(initial: f32) -> Self {
        Self { value: initial }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Record `candidate`; `true` only on a strict increase.
    pub fn observe(&mut self, candidate: f32) -> bool {
        if candidate > self.value {
            self.value = candidate;
            true
        } else {
            false
        }
    }
}

// ============================================================================
// Summary
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingSummary {
    pub iterations: usize,
    /// Number of portfolio values observed.
    pub global_steps: usize,
    pub best_portfolio: f32,
    /// Last realized portfolio value (`1.0` if none).
    pub final_portfolio: f32,
    /// Successful model saves triggered by a new best.
    pub checkpoints_written: usize,
    pub elapsed: Duration,
}

// ============================================================================
// Trainer
// ============================================================================

pub struct Td3Trainer<B, P, V, PO, VO, X, C, T>
where
    B: AutodiffBackend,
    P: PolicyEstimator<B> + AutodiffModule<B>,
    V: ValueEstimator<B> + AutodiffModule<B>,
    PO: Optimizer<P, B>,
    VO: Optimizer<V, B>,
    X: Exploration<B, P>,
    C: CheckpointStore<B, P, V>,
    T: Telemetry,
{
    learner: Td3Learner<B, P, V, PO, VO>,
    exploration: X,
    checkpoint: C,
    telemetry: T,
    progress: ProgressMarker,
    reclaimer: Box<dyn MemoryReclaimer>,
    config: TrainerConfig,
}

impl<B, P, V, PO, VO, X, C, T> Td3Trainer<B, P, V, PO, VO, X, C, T>
where
    B: AutodiffBackend,
    P: PolicyEstimator<B> + AutodiffModule<B>,
    V: ValueEstimator<B> + AutodiffModule<B>,
    PO: Optimizer<P, B>,
    VO: Optimizer<V, B>,
    X: Exploration<B, P>,
    C: CheckpointStore<B, P, V>,
    T: Telemetry,
{
    pub fn new(
        learner: Td3Learner<B, P, V, PO, VO>,
        exploration: X,
        checkpoint: C,
        telemetry: T,
        config: TrainerConfig,
    ) -> Self {
        Self {
            learner,
            exploration,
            checkpoint,
            telemetry,
            progress: ProgressMarker::new(config.progress_bar_path.clone()),
            reclaimer: Box::new(NoopReclaimer),
            config,
        }
    }

    pub fn with_reclaimer(mut self, reclaimer: impl MemoryReclaimer + 'static) -> Self {
        self.reclaimer = Box::new(reclaimer);
        self
    }

    pub fn learner(&self) -> &Td3Learner<B, P, V, PO, VO> {
        &self.learner
    }

    pub fn learner_mut(&mut self) -> &mut Td3Learner<B, P, V, PO, VO> {
        &mut self.learner
    }

    pub fn checkpoint(&self) -> &C {
        &self.checkpoint
    }

    pub fn telemetry(&self) -> &T {
        &self.telemetry
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Run `max_iter_num` iterations, updating `best` along the way.
    ///
    /// The trainer configuration is validated before any exploration
    /// happens. The learner validated its own on construction.
    ///
    /// # Arguments
    /// * `best` - Best portfolio value so far, carried across calls and
    ///   raised whenever a realized value strictly exceeds it
    ///
    /// # Returns
    /// A [`TrainingSummary`] once every iteration has run, or the first
    /// configuration, exploration or batch error.
    ///
    /// # Example
    /// ```ignore
    /// let mut best = BestPortfolio::default();
    /// let summary = trainer.learn(&mut best)?;
    /// println!("best {} after {} steps", summary.best_portfolio, summary.global_steps);
    /// ```
    pub fn learn(&mut self, best: &mut BestPortfolio) -> Result<TrainingSummary, Td3Error> {
        self.config.validate()?;

        let max_iter = self.config.max_iter_num;
        let start = Instant::now();

        self.exploration.warm_up(self.learner.policy())?;
        info!("learning started");

        let mut global_step = 0usize;
        let mut current_portfolio = 1.0f32;
        let mut checkpoints_written = 0usize;

        for iteration in 0..max_iter {
            self.progress.update(iteration, max_iter);

            let round = self.exploration.explore(self.learner.policy())?;

            for &portfolio in &round.portfolio_values {
                global_step += 1;
                self.emit(tags::PORTFOLIO, portfolio, global_step);
                current_portfolio = portfolio;

                if best.observe(portfolio) {
                    info!(
                        iteration = iteration + 1,
                        "new best portfolio: {:.3}",
                        best.value()
                    );
                    if self.save_models() {
                        checkpoints_written += 1;
                    }
                }
            }
            self.emit(tags::EXPLORE_TIME, round.elapsed.as_secs_f32(), iteration);

            let update = self.learner.update_params(&round.batch, iteration)?;
            if update.actor_updated() {
                self.emit_update(&update, round.avg_reward, iteration);
            }

            if (iteration + 1) % self.config.log_interval == 0 {
                info!(
                    "total update time: {:.1} secs, iter={}, avg_reward={:.3}, current_portfolio: {:.3}",
                    start.elapsed().as_secs_f32(),
                    iteration + 1,
                    round.avg_reward,
                    current_portfolio
                );
            }

            self.reclaimer.reclaim();
        }

        info!("final best portfolio: {:.3}", best.value());
        if let Err(e) = self.checkpoint.save_best_portfolio(best.value(), max_iter) {
            warn!(error = %e, "failed to save best portfolio");
        }
        if let Err(e) = self.telemetry.flush() {
            warn!(error = %e, "failed to flush telemetry");
        }

        Ok(TrainingSummary {
            iterations: max_iter,
            global_steps: global_step,
            best_portfolio: best.value(),
            final_portfolio: current_portfolio,
            checkpoints_written,
            elapsed: start.elapsed(),
        })
    }

    fn save_models(&mut self) -> bool {
        match self
            .checkpoint
            .save_models(self.learner.policy(), self.learner.value())
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to save models");
                false
            }
        }
    }

    fn emit_update(&mut self, update: &UpdateOutput, avg_reward: f32, iteration: usize) {
        self.emit(tags::UPDATE_TIME, update.elapsed.as_secs_f32(), iteration);
        self.emit(tags::VALUE_LOSS, update.critic_loss, iteration);
        self.emit(tags::POLICY_LOSS, update.actor_loss(), iteration);
        self.emit(tags::ACTION_REG, update.action_reg(), iteration);
        self.emit(tags::POLICY_REG, update.actor_reg(), iteration);
        self.emit(tags::POLICY_REWARD, avg_reward, iteration);
    }

    fn emit(&mut self, tag: &str, value: f32, step: usize) {
        if let Err(e) = self.telemetry.scalar(tag, value, step) {
            warn!(tag, error = %e, "telemetry write failed");
        }
    }
}
