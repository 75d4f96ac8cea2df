//! Training loop tests with scripted exploration.
//!
//! # Test Categories
//!
//! 1. Best portfolio tracking and checkpoint triggers
//! 2. Telemetry tags and steps
//! 3. Progress marker and finalization
//! 4. Failure handling: persistence and telemetry errors continue,
//!    exploration and configuration errors stop
//! 5. Memory reclamation per iteration

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use burn::backend::{Autodiff, NdArray};
use burn::module::Module;
use burn::optim::Optimizer;
use burn::tensor::backend::Backend;
use tempfile::tempdir;

use crate::algorithms::td3::{adam_optimizers, Td3Learner};
use crate::checkpoint::{CheckpointStore, Checkpointer, CheckpointerConfig};
use crate::config::{Td3Config, TrainerConfig};
use crate::core::batch::TransitionBatch;
use crate::error::{CheckpointError, ConfigError, ExplorationError, Td3Error, TelemetryError};
use crate::metrics::telemetry::tags;
use crate::metrics::{MemoryTelemetry, Telemetry};
use crate::nn::{MlpPolicy, MlpPolicyConfig, TwinMlpCritic, TwinMlpCriticConfig};
use crate::runners::exploration::{Exploration, ExplorationRound};
use crate::runners::memory::MemoryReclaimer;
use crate::runners::trainer::{BestPortfolio, Td3Trainer};

type TestAutodiffBackend = Autodiff<NdArray<f32>>;
type Policy = MlpPolicy<TestAutodiffBackend>;
type Value = TwinMlpCritic<TestAutodiffBackend>;

// ============================================================================
// Fixtures
// ============================================================================

/// Replays a fixed list of portfolio paths, one per round.
struct ScriptedExploration {
    rounds: VecDeque<Vec<f32>>,
    warmed_up: bool,
}

impl ScriptedExploration {
    fn new(rounds: Vec<Vec<f32>>) -> Self {
        Self {
            rounds: rounds.into(),
            warmed_up: false,
        }
    }
}

fn small_batch() -> TransitionBatch {
    let mut batch = TransitionBatch::new(1, 2, 1);
    batch.push(&[0.1, 0.2], &[0.5], 0.01, &[0.2, 0.1], false).unwrap();
    batch.push(&[0.2, 0.1], &[-0.3], -0.02, &[0.0, 0.3], true).unwrap();
    batch
}

impl Exploration<TestAutodiffBackend, Policy> for ScriptedExploration {
    fn warm_up(&mut self, _policy: &Policy) -> Result<(), ExplorationError> {
        self.warmed_up = true;
        Ok(())
    }

    fn explore(&mut self, _policy: &Policy) -> Result<ExplorationRound, ExplorationError> {
        assert!(self.warmed_up, "explore before warm_up");
        let portfolio_values = self
            .rounds
            .pop_front()
            .ok_or_else(|| ExplorationError::Snapshot("script exhausted".into()))?;
        let batch = small_batch();
        Ok(ExplorationRound {
            avg_reward: batch.mean_reward(),
            batch,
            elapsed: Duration::from_millis(1),
            portfolio_values,
        })
    }
}

/// Records calls instead of writing files.
#[derive(Default)]
struct CountingStore {
    model_saves: usize,
    best_saves: Vec<(f32, usize)>,
    fail_models: bool,
}

impl<B: Backend, P: Module<B>, V: Module<B>> CheckpointStore<B, P, V> for CountingStore {
    fn save_models(&mut self, _policy: &P, _value: &V) -> Result<(), CheckpointError> {
        self.model_saves += 1;
        if self.fail_models {
            return Err(CheckpointError::Recorder("disk full".into()));
        }
        Ok(())
    }

    fn save_best_portfolio(&mut self, best: f32, iteration: usize) -> Result<(), CheckpointError> {
        self.best_saves.push((best, iteration));
        Ok(())
    }
}

/// Rejects every write.
struct FailingTelemetry;

impl Telemetry for FailingTelemetry {
    fn scalar(&mut self, _tag: &str, _value: f32, _step: usize) -> Result<(), TelemetryError> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed").into())
    }

    fn flush(&mut self) -> Result<(), TelemetryError> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed").into())
    }
}

/// Counts `reclaim` calls through a shared counter.
struct CountingReclaimer(Arc<AtomicUsize>);

impl MemoryReclaimer for CountingReclaimer {
    fn reclaim(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn learner() -> Td3Learner<
    TestAutodiffBackend,
    Policy,
    Value,
    impl Optimizer<Policy, TestAutodiffBackend>,
    impl Optimizer<Value, TestAutodiffBackend>,
> {
    let device = Default::default();
    let config = Td3Config::default();
    let policy = MlpPolicyConfig::new(2, 1)
        .with_hidden_layers(vec![8])
        .init::<TestAutodiffBackend>(&device);
    let value = TwinMlpCriticConfig::new(2, 1)
        .with_hidden_layers(vec![8])
        .init::<TestAutodiffBackend>(&device);
    let (po, vo) = adam_optimizers::<TestAutodiffBackend, Policy, Value>();
    Td3Learner::new(policy, value, po, vo, config, device).unwrap()
}

fn trainer_config(dir: &std::path::Path, max_iter: usize) -> TrainerConfig {
    TrainerConfig::new()
        .with_max_iter_num(max_iter)
        .with_log_interval(2)
        .with_model_dir(dir.join("models"))
        .with_progress_bar_path(dir.join("progress.txt"))
}

// ============================================================================
// Best portfolio and checkpoints
// ============================================================================

#[test]
fn test_saves_exactly_on_strict_improvement() {
    let dir = tempdir().unwrap();
    let script = vec![
        vec![1.00, 1.02, 1.01],
        vec![1.02, 1.05],
        vec![0.97, 1.05, 1.06],
    ];
    let mut trainer = Td3Trainer::new(
        learner(),
        ScriptedExploration::new(script.clone()),
        CountingStore::default(),
        MemoryTelemetry::new(),
        trainer_config(dir.path(), script.len()),
    );

    let mut best = BestPortfolio::default();
    let summary = trainer.learn(&mut best).unwrap();

    // 1.00, 1.02, 1.05, 1.06 are records; repeats of 1.02 and 1.05 are not
    assert_eq!(trainer.checkpoint().model_saves, 4);
    assert_eq!(summary.checkpoints_written, 4);
    assert_eq!(best.value(), 1.06);
    assert_eq!(summary.best_portfolio, 1.06);
    assert_eq!(summary.final_portfolio, 1.06);
    assert_eq!(summary.global_steps, 8);
    assert_eq!(summary.iterations, 3);
}

#[test]
fn test_best_is_carried_in_from_caller() {
    let dir = tempdir().unwrap();
    let mut trainer = Td3Trainer::new(
        learner(),
        ScriptedExploration::new(vec![vec![1.1, 1.3], vec![1.2]]),
        CountingStore::default(),
        MemoryTelemetry::new(),
        trainer_config(dir.path(), 2),
    );

    let mut best = BestPortfolio::new(1.25);
    trainer.learn(&mut best).unwrap();

    assert_eq!(trainer.checkpoint().model_saves, 1);
    assert_eq!(best.value(), 1.3);
}

#[test]
fn test_best_portfolio_saved_once_at_end() {
    let dir = tempdir().unwrap();
    let mut trainer = Td3Trainer::new(
        learner(),
        ScriptedExploration::new(vec![vec![1.0], vec![1.4], vec![1.2]]),
        CountingStore::default(),
        MemoryTelemetry::new(),
        trainer_config(dir.path(), 3),
    );

    let mut best = BestPortfolio::default();
    trainer.learn(&mut best).unwrap();

    assert_eq!(trainer.checkpoint().best_saves, vec![(1.4, 3)]);
}

#[test]
fn test_checkpoint_failure_does_not_stop_training() {
    let dir = tempdir().unwrap();
    let store = CountingStore {
        fail_models: true,
        ..CountingStore::default()
    };
    let mut trainer = Td3Trainer::new(
        learner(),
        ScriptedExploration::new(vec![vec![1.0, 1.1], vec![1.2]]),
        store,
        MemoryTelemetry::new(),
        trainer_config(dir.path(), 2),
    );

    let mut best = BestPortfolio::default();
    let summary = trainer.learn(&mut best).unwrap();

    assert_eq!(trainer.checkpoint().model_saves, 3, "every improvement still attempts a save");
    assert_eq!(summary.checkpoints_written, 0);
    assert_eq!(trainer.checkpoint().best_saves.len(), 1);
    assert_eq!(best.value(), 1.2);
}

#[test]
fn test_file_checkpointer_writes_models_and_record() {
    let dir = tempdir().unwrap();
    let config = trainer_config(dir.path(), 2);
    let checkpointer = Checkpointer::new(CheckpointerConfig::new(&config.model_dir)).unwrap();
    let mut trainer = Td3Trainer::new(
        learner(),
        ScriptedExploration::new(vec![vec![1.0, 1.5], vec![1.1]]),
        checkpointer,
        MemoryTelemetry::new(),
        config,
    );

    let mut best = BestPortfolio::default();
    trainer.learn(&mut best).unwrap();

    let checkpointer = trainer.checkpoint();
    assert_eq!(checkpointer.models_saved(), 2);
    assert!(checkpointer.config().policy_path().exists());
    assert!(checkpointer.config().value_path().exists());

    let record = checkpointer.load_best_portfolio().unwrap();
    assert_eq!(record.best_portfolio, Some(1.5));
    assert_eq!(record.iteration, 2);
}

// ============================================================================
// Telemetry
// ============================================================================

#[test]
fn test_portfolio_telemetry_uses_global_step() {
    let dir = tempdir().unwrap();
    let telemetry = MemoryTelemetry::new();
    let mut trainer = Td3Trainer::new(
        learner(),
        ScriptedExploration::new(vec![vec![1.0, 1.1], vec![1.05, 0.9, 1.2]]),
        CountingStore::default(),
        telemetry.clone(),
        trainer_config(dir.path(), 2),
    );

    trainer.learn(&mut BestPortfolio::default()).unwrap();

    assert_eq!(
        telemetry.series(tags::PORTFOLIO),
        vec![(1, 1.0), (2, 1.1), (3, 1.05), (4, 0.9), (5, 1.2)]
    );
    let explore_steps: Vec<usize> = telemetry
        .series(tags::EXPLORE_TIME)
        .into_iter()
        .map(|(step, _)| step)
        .collect();
    assert_eq!(explore_steps, vec![0, 1]);
}

#[test]
fn test_update_telemetry_only_on_actor_iterations() {
    let dir = tempdir().unwrap();
    let telemetry = MemoryTelemetry::new();
    let rounds = vec![vec![1.0]; 5];
    let mut trainer = Td3Trainer::new(
        learner(),
        ScriptedExploration::new(rounds),
        CountingStore::default(),
        telemetry.clone(),
        trainer_config(dir.path(), 5),
    );

    trainer.learn(&mut BestPortfolio::default()).unwrap();

    // policy_freq = 2: iterations 0, 2, 4
    for tag in [
        tags::UPDATE_TIME,
        tags::VALUE_LOSS,
        tags::POLICY_LOSS,
        tags::ACTION_REG,
        tags::POLICY_REG,
        tags::POLICY_REWARD,
    ] {
        let steps: Vec<usize> = telemetry.series(tag).into_iter().map(|(s, _)| s).collect();
        assert_eq!(steps, vec![0, 2, 4], "tag {tag}");
    }

    let expected_reward = small_batch().mean_reward();
    for (_, reward) in telemetry.series(tags::POLICY_REWARD) {
        assert!((reward - expected_reward).abs() < 1e-6);
    }
}

#[test]
fn test_telemetry_failure_does_not_stop_training() {
    let dir = tempdir().unwrap();
    let mut trainer = Td3Trainer::new(
        learner(),
        ScriptedExploration::new(vec![vec![1.0, 1.1], vec![1.2], vec![0.9]]),
        CountingStore::default(),
        FailingTelemetry,
        trainer_config(dir.path(), 3),
    );

    let mut best = BestPortfolio::default();
    let summary = trainer.learn(&mut best).unwrap();

    assert_eq!(summary.iterations, 3);
    assert_eq!(summary.global_steps, 4);
    assert_eq!(best.value(), 1.2);
    assert_eq!(trainer.checkpoint().best_saves, vec![(1.2, 3)]);
}

// ============================================================================
// Progress and errors
// ============================================================================

#[test]
fn test_progress_marker_holds_last_iteration() {
    let dir = tempdir().unwrap();
    let config = trainer_config(dir.path(), 3);
    let progress_path = config.progress_bar_path.clone();
    let mut trainer = Td3Trainer::new(
        learner(),
        ScriptedExploration::new(vec![vec![1.0]; 3]),
        CountingStore::default(),
        MemoryTelemetry::new(),
        config,
    );

    trainer.learn(&mut BestPortfolio::default()).unwrap();

    assert_eq!(fs::read_to_string(progress_path).unwrap(), "2,3");
}

#[test]
fn test_exploration_error_ends_run() {
    let dir = tempdir().unwrap();
    let mut trainer = Td3Trainer::new(
        learner(),
        ScriptedExploration::new(vec![vec![1.0]]),
        CountingStore::default(),
        MemoryTelemetry::new(),
        trainer_config(dir.path(), 3),
    );

    let err = trainer.learn(&mut BestPortfolio::default()).unwrap_err();

    assert!(matches!(err, Td3Error::Exploration(ExplorationError::Snapshot(_))));
    assert!(trainer.checkpoint().best_saves.is_empty());
}

#[test]
fn test_zero_iterations_only_finalizes() {
    let dir = tempdir().unwrap();
    let mut trainer = Td3Trainer::new(
        learner(),
        ScriptedExploration::new(Vec::new()),
        CountingStore::default(),
        MemoryTelemetry::new(),
        trainer_config(dir.path(), 0),
    );

    let summary = trainer.learn(&mut BestPortfolio::default()).unwrap();

    assert_eq!(summary.global_steps, 0);
    assert_eq!(summary.final_portfolio, 1.0);
    assert_eq!(trainer.checkpoint().best_saves, vec![(f32::NEG_INFINITY, 0)]);
}

#[test]
fn test_invalid_trainer_config_rejected_before_exploring() {
    let dir = tempdir().unwrap();
    let config = trainer_config(dir.path(), 3).with_log_interval(0);
    let progress_path = config.progress_bar_path.clone();
    let mut trainer = Td3Trainer::new(
        learner(),
        ScriptedExploration::new(vec![vec![1.0]; 3]),
        CountingStore::default(),
        MemoryTelemetry::new(),
        config,
    );

    let err = trainer.learn(&mut BestPortfolio::default()).unwrap_err();

    assert!(matches!(
        err,
        Td3Error::Config(ConfigError::Invalid { field: "log_interval", .. })
    ));
    assert!(!progress_path.exists());
    assert_eq!(trainer.checkpoint().model_saves, 0);
    assert!(trainer.checkpoint().best_saves.is_empty());
}

// ============================================================================
// Memory reclamation
// ============================================================================

#[test]
fn test_reclaim_runs_once_per_iteration() {
    let dir = tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut trainer = Td3Trainer::new(
        learner(),
        ScriptedExploration::new(vec![vec![1.0]; 4]),
        CountingStore::default(),
        MemoryTelemetry::new(),
        trainer_config(dir.path(), 4),
    )
    .with_reclaimer(CountingReclaimer(calls.clone()));

    trainer.learn(&mut BestPortfolio::default()).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), trainer.config().max_iter_num);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}
