//! Model and best-portfolio persistence.
//!
//! Layout of `model_dir`:
//!
//! ```text
//! model_dir/
//! ├── policy.bin            live policy, BinFileRecorder (full precision)
//! ├── value.bin             live twin critic
//! └── best_portfolio.json   {"best_portfolio": 1.23, "iteration": 42}
//! ```
//!
//! Models are overwritten on every save; only the latest best survives.

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::error::CheckpointError;

/// Persistence used by the training loop.
pub trait CheckpointStore<B: Backend, P: Module<B>, V: Module<B>> {
    /// Persist the live policy and critic.
    fn save_models(&mut self, policy: &P, value: &V) -> Result<(), CheckpointError>;

    /// Persist the best portfolio value seen in the run.
    fn save_best_portfolio(&mut self, best: f32, iteration: usize) -> Result<(), CheckpointError>;
}

/// Configuration for the checkpointer.
#[derive(Debug, Clone)]
pub struct CheckpointerConfig {
    pub model_dir: PathBuf,
    pub policy_file: String,
    pub value_file: String,
    pub best_portfolio_file: String,
}

impl Default for CheckpointerConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("./models"),
            policy_file: "policy.bin".to_string(),
            value_file: "value.bin".to_string(),
            best_portfolio_file: "best_portfolio.json".to_string(),
        }
    }
}

impl CheckpointerConfig {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_policy_file(mut self, name: impl Into<String>) -> Self {
        self.policy_file = name.into();
        self
    }

    pub fn with_value_file(mut self, name: impl Into<String>) -> Self {
        self.value_file = name.into();
        self
    }

    pub fn policy_path(&self) -> PathBuf {
        self.model_dir.join(&self.policy_file)
    }

    pub fn value_path(&self) -> PathBuf {
        self.model_dir.join(&self.value_file)
    }

    pub fn best_portfolio_path(&self) -> PathBuf {
        self.model_dir.join(&self.best_portfolio_file)
    }
}

/// Contents of `best_portfolio.json`.
///
/// `best_portfolio` is `None` when no finite value was ever observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestPortfolioRecord {
    pub best_portfolio: Option<f32>,
    pub iteration: usize,
}

/// File-backed [`CheckpointStore`].
#[derive(Debug)]
pub struct Checkpointer {
    config: CheckpointerConfig,
    models_saved: usize,
}

impl Checkpointer {
    /// Create the checkpointer and its directory.
    pub fn new(config: CheckpointerConfig) -> Result<Self, CheckpointError> {
        fs::create_dir_all(&config.model_dir)?;
        Ok(Self {
            config,
            models_saved: 0,
        })
    }

    pub fn config(&self) -> &CheckpointerConfig {
        &self.config
    }

    /// Number of successful model saves.
    pub fn models_saved(&self) -> usize {
        self.models_saved
    }

    fn save_module<B: Backend, M: Module<B>>(module: &M, path: &Path) -> Result<(), CheckpointError> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        module
            .clone()
            .save_file(path, &recorder)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))
    }

    fn load_module<B: Backend, M: Module<B>>(
        template: M,
        path: &Path,
        device: &B::Device,
    ) -> Result<M, CheckpointError> {
        if !path.exists() {
            return Err(CheckpointError::NotFound(path.to_path_buf()));
        }
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        template
            .load_file(path, &recorder, device)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))
    }

    /// Load saved policy weights into `template`.
    pub fn load_policy<B: Backend, P: Module<B>>(
        &self,
        template: P,
        device: &B::Device,
    ) -> Result<P, CheckpointError> {
        Self::load_module(template, &self.config.policy_path(), device)
    }

    /// Load saved critic weights into `template`.
    pub fn load_value<B: Backend, V: Module<B>>(
        &self,
        template: V,
        device: &B::Device,
    ) -> Result<V, CheckpointError> {
        Self::load_module(template, &self.config.value_path(), device)
    }

    pub fn load_best_portfolio(&self) -> Result<BestPortfolioRecord, CheckpointError> {
        let path = self.config.best_portfolio_path();
        if !path.exists() {
            return Err(CheckpointError::NotFound(path));
        }
        let contents = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl<B: Backend, P: Module<B>, V: Module<B>> CheckpointStore<B, P, V> for Checkpointer {
    fn save_models(&mut self, policy: &P, value: &V) -> Result<(), CheckpointError> {
        Self::save_module(policy, &self.config.policy_path())?;
        Self::save_module(value, &self.config.value_path())?;
        self.models_saved += 1;
        Ok(())
    }

    fn save_best_portfolio(&mut self, best: f32, iteration: usize) -> Result<(), CheckpointError> {
        let record = BestPortfolioRecord {
            best_portfolio: best.is_finite().then_some(best),
            iteration,
        };
        fs::write(
            self.config.best_portfolio_path(),
            serde_json::to_string_pretty(&record)?,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::{Linear, LinearConfig};
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    fn values(layer: &Linear<TestBackend>) -> Vec<f32> {
        layer.weight.val().into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_creates_model_dir() {
        let dir = tempdir().unwrap();
        let model_dir = dir.path().join("nested").join("models");

        let _checkpointer = Checkpointer::new(CheckpointerConfig::new(&model_dir)).unwrap();

        assert!(model_dir.is_dir());
    }

    #[test]
    fn test_save_and_load_models() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let mut checkpointer = Checkpointer::new(CheckpointerConfig::new(dir.path())).unwrap();
        let policy: Linear<TestBackend> = LinearConfig::new(3, 2).init(&device);
        let value: Linear<TestBackend> = LinearConfig::new(4, 1).init(&device);

        CheckpointStore::<TestBackend, _, _>::save_models(&mut checkpointer, &policy, &value).unwrap();

        assert_eq!(checkpointer.models_saved(), 1);
        assert!(checkpointer.config().policy_path().exists());
        assert!(checkpointer.config().value_path().exists());

        let loaded = checkpointer
            .load_policy::<TestBackend, _>(LinearConfig::new(3, 2).init(&device), &device)
            .unwrap();
        assert_eq!(values(&loaded), values(&policy));
    }

    #[test]
    fn test_best_portfolio_round_trip() {
        let dir = tempdir().unwrap();
        let mut checkpointer = Checkpointer::new(CheckpointerConfig::new(dir.path())).unwrap();

        CheckpointStore::<TestBackend, Linear<TestBackend>, Linear<TestBackend>>::save_best_portfolio(
            &mut checkpointer,
            1.25,
            7,
        )
        .unwrap();

        let record = checkpointer.load_best_portfolio().unwrap();
        assert_eq!(
            record,
            BestPortfolioRecord {
                best_portfolio: Some(1.25),
                iteration: 7
            }
        );
    }

    #[test]
    fn test_non_finite_best_is_stored_as_null() {
        let dir = tempdir().unwrap();
        let mut checkpointer = Checkpointer::new(CheckpointerConfig::new(dir.path())).unwrap();

        CheckpointStore::<TestBackend, Linear<TestBackend>, Linear<TestBackend>>::save_best_portfolio(
            &mut checkpointer,
            f32::NEG_INFINITY,
            0,
        )
        .unwrap();

        assert_eq!(checkpointer.load_best_portfolio().unwrap().best_portfolio, None);
    }

    #[test]
    fn test_missing_checkpoint() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let checkpointer = Checkpointer::new(CheckpointerConfig::new(dir.path())).unwrap();

        let result = checkpointer
            .load_value::<TestBackend, _>(LinearConfig::new(2, 1).init::<TestBackend>(&device), &device);

        assert!(matches!(result, Err(CheckpointError::NotFound(_))));
    }
}
