//! Global L2 norm clipping of a module's gradients.
//!
//! ```text
//! ‖g‖ = sqrt(Σ_i Σ_j g_ij²)         over every parameter i of the module
//! g  ← g · max / (‖g‖ + 1e-6)       only when ‖g‖ > max
//! ```
//!
//! All parameters share one scale factor, so the direction of the full
//! gradient is preserved. Parameters without a gradient are skipped.

use burn::module::{AutodiffModule, ModuleMapper, Param};
use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor};

const EPSILON: f32 = 1e-6;

/// Sums the squared gradient entries of every visited parameter.
struct SquaredNorm<'a> {
    grads: &'a GradientsParams,
    sum: f64,
}

impl<B: AutodiffBackend> ModuleMapper<B> for SquaredNorm<'_> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(param.id) {
            let squared = grad.powf_scalar(2.0).sum().into_scalar().elem::<f32>();
            self.sum += f64::from(squared);
        }
        param
    }
}

/// Multiplies the gradient of every visited parameter by `scale`.
struct GradScaler<'a> {
    grads: &'a mut GradientsParams,
    scale: f32,
}

impl<B: AutodiffBackend> ModuleMapper<B> for GradScaler<'_> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(param.id) {
            self.grads
                .register::<B::InnerBackend, D>(param.id, grad.mul_scalar(self.scale));
        }
        param
    }
}

/// Total L2 norm of the gradients `grads` holds for `module`'s parameters.
pub fn global_grad_norm<B, M>(module: &M, grads: &GradientsParams) -> f32
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut norm = SquaredNorm { grads, sum: 0.0 };
    let _ = module.clone().map(&mut norm);
    norm.sum.sqrt() as f32
}

/// Rescale `grads` so their global norm over `module` is at most `max_norm`.
///
/// # Arguments
/// * `module` - Module whose parameter ids select the gradients
/// * `grads` - Gradients from `GradientsParams::from_grads`
/// * `max_norm` - Upper bound on the total norm, must be positive
///
/// # Returns
/// The (possibly rescaled) gradients and the norm measured before clipping.
///
/// # Example
/// ```ignore
/// let grads = GradientsParams::from_grads(loss.backward(), &policy);
/// let (grads, norm) = clip_grad_norm(&policy, grads, 0.5);
/// policy = optimizer.step(lr, policy, grads);
/// ```
pub fn clip_grad_norm<B, M>(
    module: &M,
    mut grads: GradientsParams,
    max_norm: f32,
) -> (GradientsParams, f32)
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let norm = global_grad_norm::<B, M>(module, &grads);
    if norm > max_norm {
        let mut scaler = GradScaler {
            grads: &mut grads,
            scale: max_norm / (norm + EPSILON),
        };
        let _ = module.clone().map(&mut scaler);
    }
    (grads, norm)
}
