//! Gradient clipping by the global L2 norm.
//!
//! The norm is taken over every parameter gradient of a module at once, so
//! after clipping the concatenation of all gradients has norm at most the
//! ceiling.

use burn::module::{Module, ModuleVisitor, ParamId};
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

const NORM_EPSILON: f64 = 1e-6;

struct SquaredNorm<'a> {
    grads: &'a GradientsParams,
    total: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            let sq: f32 = (grad.clone() * grad).sum().into_scalar().elem();
            self.total += f64::from(sq);
        }
    }
}

struct ScaleGrads<'a> {
    grads: &'a mut GradientsParams,
    factor: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for ScaleGrads<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register::<B::InnerBackend, D>(id, grad.mul_scalar(self.factor));
        }
    }
}

/// L2 norm of all gradients in `grads` that belong to `module`.
pub fn grad_norm<B, M>(module: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: Module<B>,
{
    let mut visitor = SquaredNorm { grads, total: 0.0 };
    module.visit(&mut visitor);
    visitor.total.sqrt()
}

/// Rescale `grads` so their global L2 norm does not exceed `max_norm`.
///
/// Gradients are multiplied by `max_norm / (norm + 1e-6)` when the norm is
/// above the ceiling and left untouched otherwise. Returns the gradients
/// and the norm measured before clipping.
pub fn clip_grad_norm<B, M>(module: &M, mut grads: GradientsParams, max_norm: f64) -> (GradientsParams, f64)
where
    B: AutodiffBackend,
    M: Module<B>,
{
    let norm = grad_norm::<B, M>(module, &grads);
    if norm > max_norm {
        let factor = max_norm / (norm + NORM_EPSILON);
        let mut visitor = ScaleGrads {
            grads: &mut grads,
            factor,
        };
        module.visit(&mut visitor);
        tracing::trace!(norm, max_norm, factor, "Clipped gradients");
    }
    (grads, norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use burn::nn::{Linear, LinearConfig};
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;

    type TestAutodiffBackend = Autodiff<NdArray>;

    fn linear_grads(scale: f32) -> (Linear<TestAutodiffBackend>, GradientsParams) {
        let device = Default::default();
        let linear = LinearConfig::new(4, 3).init::<TestAutodiffBackend>(&device);
        let x = Tensor::<TestAutodiffBackend, 2>::ones([2, 4], &device).mul_scalar(10.0);
        let loss = linear.forward(x).sum().mul_scalar(scale);
        let grads = GradientsParams::from_grads(loss.backward(), &linear);
        (linear, grads)
    }

    #[test]
    fn test_global_norm_bounded_by_ceiling() {
        // weight and bias gradients together, each well above the ceiling
        let (linear, grads) = linear_grads(100.0);
        let before = grad_norm::<TestAutodiffBackend, _>(&linear, &grads);
        assert!(before > 1.0);

        let (clipped, reported) = clip_grad_norm::<TestAutodiffBackend, _>(&linear, grads, 1.0);
        assert_relative_eq!(reported, before);

        let after = grad_norm::<TestAutodiffBackend, _>(&linear, &clipped);
        assert!(after <= 1.0 + 1e-4, "global norm {after} above ceiling");
        assert!(after > 0.99);
    }

    #[test]
    fn test_two_tensors_below_ceiling_each() {
        // each tensor alone is under the ceiling but the pair is not
        let (linear, grads) = linear_grads(1.0);
        let before = grad_norm::<TestAutodiffBackend, _>(&linear, &grads);
        let weight_only: f32 = {
            let w = grads.get::<NdArray, 2>(linear.weight.id).unwrap();
            (w.clone() * w).sum().into_scalar()
        };
        let ceiling = f64::from(weight_only).sqrt() * 1.0005;
        assert!(before > ceiling);

        let (clipped, _) = clip_grad_norm::<TestAutodiffBackend, _>(&linear, grads, ceiling);
        let after = grad_norm::<TestAutodiffBackend, _>(&linear, &clipped);
        assert!(after <= ceiling * (1.0 + 1e-5));
    }

    #[test]
    fn test_small_gradients_untouched() {
        let (linear, grads) = linear_grads(1e-4);
        let before = grad_norm::<TestAutodiffBackend, _>(&linear, &grads);
        assert!(before < 1.0);

        let (clipped, _) = clip_grad_norm::<TestAutodiffBackend, _>(&linear, grads, 1.0);
        let after = grad_norm::<TestAutodiffBackend, _>(&linear, &clipped);
        assert_relative_eq!(after, before);
    }
}
