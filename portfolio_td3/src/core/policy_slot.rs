//! Versioned policy snapshot shared with exploration workers.
//!
//! The learner serializes the live policy with `BinBytesRecorder` and
//! publishes the bytes here. Workers rebuild a policy from their factory and
//! load the latest bytes before each round. Serialized bytes are always
//! `Send + Sync`, which module records on some backends are not.
//!
//! ```text
//! learner                         worker i
//! policy.into_record()            factory(&device)
//!   -> recorder.record()            <- recorder.load()
//!   -> PolicySlot::publish  ----->  PolicySlot::snapshot
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use burn::module::Module;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use parking_lot::Mutex;

use crate::error::ExplorationError;

/// Single-writer, many-reader slot holding the latest policy bytes.
///
/// Readers may observe a snapshot one publish behind the learner.
pub struct PolicySlot {
    bytes: Mutex<Option<Arc<Vec<u8>>>>,
    version: AtomicU64,
}

impl PolicySlot {
    pub fn new() -> Self {
        Self {
            bytes: Mutex::new(None),
            version: AtomicU64::new(0),
        }
    }

    /// Number of publishes so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Replace the current snapshot.
    pub fn publish(&self, bytes: Vec<u8>) {
        let mut guard = self.bytes.lock();
        *guard = Some(Arc::new(bytes));
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Latest snapshot, shared without copying.
    pub fn snapshot(&self) -> Option<Arc<Vec<u8>>> {
        self.bytes.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.lock().is_none()
    }

    /// Serialize `module` and publish it.
    pub fn publish_module<B, M>(&self, module: &M) -> Result<(), ExplorationError>
    where
        B: Backend,
        M: Module<B>,
    {
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let bytes = recorder
            .record(module.clone().into_record(), ())
            .map_err(|e| ExplorationError::Snapshot(e.to_string()))?;
        self.publish(bytes);
        Ok(())
    }

    /// Load the latest snapshot into `module`.
    pub fn load_into<B, M>(&self, module: M, device: &B::Device) -> Result<M, ExplorationError>
    where
        B: Backend,
        M: Module<B>,
    {
        let bytes = self
            .snapshot()
            .ok_or_else(|| ExplorationError::Snapshot("no policy published yet".to_string()))?;
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let record = recorder
            .load(bytes.as_ref().clone(), device)
            .map_err(|e| ExplorationError::Snapshot(e.to_string()))?;
        Ok(module.load_record(record))
    }
}

impl Default for PolicySlot {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedPolicySlot = Arc<PolicySlot>;

pub fn policy_slot() -> SharedPolicySlot {
    Arc::new(PolicySlot::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::{Linear, LinearConfig};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_publish_bumps_version() {
        let slot = PolicySlot::new();
        assert!(slot.is_empty());
        assert_eq!(slot.version(), 0);

        slot.publish(vec![1, 2, 3]);
        slot.publish(vec![4, 5]);

        assert_eq!(slot.version(), 2);
        assert_eq!(slot.snapshot().as_deref(), Some(&vec![4, 5]));
    }

    #[test]
    fn test_snapshot_is_not_consumed() {
        let slot = policy_slot();
        slot.publish(vec![7]);
        let reader = Arc::clone(&slot);

        assert!(reader.snapshot().is_some());
        assert!(slot.snapshot().is_some());
    }

    #[test]
    fn test_module_round_trip() {
        let device = Default::default();
        let source: Linear<TestBackend> = LinearConfig::new(3, 2).init(&device);
        let fresh: Linear<TestBackend> = LinearConfig::new(3, 2).init(&device);
        let slot = PolicySlot::new();

        slot.publish_module::<TestBackend, _>(&source).unwrap();
        let loaded = slot.load_into::<TestBackend, _>(fresh, &device).unwrap();

        assert_eq!(
            loaded.weight.val().into_data().to_vec::<f32>().unwrap(),
            source.weight.val().into_data().to_vec::<f32>().unwrap()
        );
    }

    #[test]
    fn test_load_from_empty_slot_fails() {
        let device = Default::default();
        let module: Linear<TestBackend> = LinearConfig::new(2, 2).init(&device);
        let slot = PolicySlot::new();

        let result = slot.load_into::<TestBackend, _>(module, &device);
        assert!(matches!(result, Err(ExplorationError::Snapshot(_))));
    }
}
