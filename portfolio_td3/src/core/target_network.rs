//! Polyak averaging of target networks.
//!
//! ```text
//! θ_target ← (1 - τ) · θ_target + τ · θ_online
//! ```
//!
//! Parameters are matched by traversal order, so the online and target
//! modules only need the same architecture, not the same parameter ids.
//! A count or shape mismatch between the two is a programming error and
//! panics.

use burn::module::{Module, ModuleMapper, Param};
use burn::prelude::*;

/// One online parameter, flattened to 1D and cut from the autodiff graph.
struct FlatParam<B: Backend> {
    shape: Vec<usize>,
    values: Tensor<B, 1>,
}

/// Collects the online parameters in traversal order.
///
/// Values are detached. Without this the target would hold references into
/// the online autodiff graph and keep it alive across iterations.
struct ParamExtractor<B: Backend> {
    params: Vec<FlatParam<B>>,
}

impl<B: Backend> ModuleMapper<B> for ParamExtractor<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let val = param.val();
        let shape = val.dims().to_vec();
        let numel: usize = shape.iter().product();

        self.params.push(FlatParam {
            shape,
            values: val.detach().reshape([numel]),
        });

        param
    }
}

/// Moves each target parameter toward its online counterpart.
struct PolyakMapper<B: Backend> {
    online: Vec<FlatParam<B>>,
    tau: f32,
    index: usize,
}

impl<B: Backend> ModuleMapper<B> for PolyakMapper<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let idx = self.index;
        self.index += 1;

        let Some(source) = self.online.get(idx) else {
            panic!(
                "soft update: target has more parameters than online ({} available)",
                self.online.len()
            );
        };

        let target_val = param.val();
        let shape = target_val.dims();
        assert_eq!(
            source.shape.as_slice(),
            shape.as_slice(),
            "soft update: shape mismatch at parameter {idx}"
        );

        let numel: usize = shape.iter().product();
        let blended = target_val.detach().reshape([numel]).mul_scalar(1.0 - self.tau)
            + source.values.clone().mul_scalar(self.tau);

        Param::initialized(param.id.clone(), blended.reshape(shape))
    }
}

/// Number of float parameter tensors a module exposes.
struct ParamCounter {
    count: usize,
}

impl<B: Backend> ModuleMapper<B> for ParamCounter {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        self.count += 1;
        param
    }
}

/// Soft-update `target` toward `online` with rate `tau` and return it.
///
/// `tau == 0` returns the target untouched. Every other value, including
/// `tau == 1`, goes through the same interpolation so the returned module
/// always keeps the target's parameter ids.
///
/// # Arguments
/// * `online` - Live module whose parameters are blended in
/// * `target` - Target module to move, consumed
/// * `tau` - Interpolation rate in `[0, 1]`
///
/// # Returns
/// The target with `(1 - tau) * target + tau * online` in every parameter,
/// keeping the target's parameter ids.
///
/// # Example
/// ```ignore
/// target_value = soft_update(&value, target_value, 0.005);
/// ```
///
/// # Panics
///
/// If the two modules differ in parameter count or in the shape of any
/// parameter.
pub fn soft_update<B, M>(online: &M, target: M, tau: f32) -> M
where
    B: Backend,
    M: Module<B>,
{
    debug_assert!((0.0..=1.0).contains(&tau), "tau {tau} outside [0, 1]");

    let mut extractor = ParamExtractor { params: Vec::new() };
    let _ = online.clone().map(&mut extractor);
    let expected = extractor.params.len();

    if tau == 0.0 {
        let mut counter = ParamCounter { count: 0 };
        let target = target.map(&mut counter);
        assert_eq!(
            counter.count, expected,
            "soft update: parameter count mismatch"
        );
        return target;
    }

    let mut mapper = PolyakMapper {
        online: extractor.params,
        tau,
        index: 0,
    };
    let target = target.map(&mut mapper);
    assert_eq!(
        mapper.index, expected,
        "soft update: target has fewer parameters than online"
    );
    target
}

/// Every float parameter of `module`, flattened in traversal order.
///
/// Two modules of the same architecture yield vectors of equal length whose
/// entries correspond one to one.
pub fn flat_parameters<B, M>(module: &M) -> Vec<f32>
where
    B: Backend,
    M: Module<B>,
{
    let mut extractor = ParamExtractor { params: Vec::new() };
    let _ = module.clone().map(&mut extractor);
    extractor
        .params
        .into_iter()
        .flat_map(|param| {
            param
                .values
                .into_data()
                .convert::<f32>()
                .to_vec::<f32>()
                .unwrap_or_default()
        })
        .collect()
}
